//! Integration coverage for candidate scoring determinism (§4.C8): given the same
//! inputs, ranking is fully reproducible, with ties broken by ETA then driver id so
//! the sequential offer order is never ambiguous.

use dispatch_core::config::DispatchConfig;
use dispatch_core::dispatch::score_candidate;
use dispatch_core::models::{Driver, DriverStatus};
use uuid::Uuid;

fn driver(id: Uuid, rating: f64, acceptance_rate: f64) -> Driver {
    Driver {
        id,
        user_id: Uuid::new_v4(),
        status: DriverStatus::Online,
        service_type: "economy".into(),
        plate_number: "PLATE".into(),
        credit_balance: 5,
        credit_expires_at: None,
        base_fare: 2.0,
        per_km_rate: 1.0,
        city: "Kabul".into(),
        province: "Kabul".into(),
        stripe_account_id: None,
        rating,
        acceptance_rate,
        last_accepted_at: None,
        suspended_until: None,
    }
}

#[test]
fn equal_scores_break_ties_by_eta_then_driver_id() {
    let config = DispatchConfig::default();
    let a = driver(Uuid::from_u128(1), 4.5, 0.8);
    let b = driver(Uuid::from_u128(2), 4.5, 0.8);

    let mut candidates = vec![
        score_candidate(&a, 8.0, None, &config),
        score_candidate(&b, 4.0, None, &config),
    ];

    assert!((candidates[0].score - candidates[1].score).abs() > 0.0, "distinct ETAs should separate the scores");

    candidates.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap()
            .then_with(|| x.eta_min.partial_cmp(&y.eta_min).unwrap())
            .then_with(|| x.driver.id.cmp(&y.driver.id))
    });

    assert_eq!(candidates[0].driver.id, b.id, "the closer driver (lower ETA) should rank first");
}

#[test]
fn scoring_is_deterministic_across_repeated_calls() {
    let config = DispatchConfig::default();
    let driver = driver(Uuid::new_v4(), 4.2, 0.65);

    let first = score_candidate(&driver, 3.3, Some("economy"), &config);
    let second = score_candidate(&driver, 3.3, Some("economy"), &config);

    assert_eq!(first.score, second.score);
    assert_eq!(first.eta_min, second.eta_min);
}

#[test]
fn service_type_mismatch_never_outscores_an_otherwise_identical_match_at_the_same_eta() {
    let config = DispatchConfig::default();
    let matched = driver(Uuid::new_v4(), 4.0, 0.5);
    let unmatched = driver(Uuid::new_v4(), 4.0, 0.5);

    let matched_score = score_candidate(&matched, 10.0, Some("economy"), &config);
    let unmatched_score = score_candidate(&unmatched, 10.0, Some("premium"), &config);

    assert!(matched_score.score > unmatched_score.score);
}
