mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use volscan::config::ScreenerConfig;
use volscan::error::ScreenError;
use volscan::models::{BandBreach, IvRegime, OptionContract, OptionType, SignalKind};
use volscan::pipeline::{PipelineSettings, evaluate_symbol};
use volscan::registry::WatchList;

use common::{Script, ScriptedGateway, atm_chain, closes_mean_100_sd_2, now};

fn settings() -> PipelineSettings {
    PipelineSettings::from_config(&ScreenerConfig::default())
}

#[tokio::test]
async fn upper_band_breach_with_elevated_iv_is_long_put() {
    let gateway = ScriptedGateway::new(0.05).with(
        "SPY",
        Script {
            closes: closes_mean_100_sd_2(),
            chain: Some(atm_chain("SPY", 105, 0.5, 0.05)),
            ..Script::default()
        },
    );

    let update = evaluate_symbol(&gateway, "SPY", &settings(), &[], now()).await;
    let snapshot = update.outcome.as_ref().unwrap();
    assert!((snapshot.bands.middle - 100.0).abs() < 1e-9);
    assert!((snapshot.bands.upper - 104.0).abs() < 1e-9);
    assert!((snapshot.bands.lower - 96.0).abs() < 1e-9);
    let iv = snapshot.implied_volatility.unwrap();
    assert!((iv - 0.5).abs() < 1e-3, "recovered IV {iv}");

    let signal = update.signal.unwrap();
    assert_eq!(signal.kind, SignalKind::LongPutCandidate);
    assert_eq!(signal.rationale.price, Some(105.0));
    assert_eq!(signal.rationale.band_breach, Some(BandBreach::Upper));
    assert_eq!(signal.rationale.iv_regime, IvRegime::Elevated);
}

#[tokio::test]
async fn lower_band_breach_with_elevated_iv_is_long_call() {
    let gateway = ScriptedGateway::new(0.05).with(
        "SPY",
        Script {
            closes: closes_mean_100_sd_2(),
            chain: Some(atm_chain("SPY", 95, 0.6, 0.05)),
            ..Script::default()
        },
    );

    let update = evaluate_symbol(&gateway, "SPY", &settings(), &[], now()).await;
    assert_eq!(
        update.signal.map(|s| s.kind),
        Some(SignalKind::LongCallCandidate)
    );
}

#[tokio::test]
async fn fifteen_closes_is_insufficient_data() {
    let gateway = ScriptedGateway::new(0.05).with(
        "SPY",
        Script {
            closes: closes_mean_100_sd_2()[..15].to_vec(),
            chain: Some(atm_chain("SPY", 105, 0.5, 0.05)),
            ..Script::default()
        },
    );

    let update = evaluate_symbol(&gateway, "SPY", &settings(), &[], now()).await;
    assert_eq!(
        update.outcome.unwrap_err(),
        ScreenError::InsufficientHistory {
            required: 20,
            available: 15
        }
    );
    assert_eq!(
        update.signal.map(|s| s.kind),
        Some(SignalKind::InsufficientData)
    );
}

#[tokio::test]
async fn zero_priced_quote_is_excluded_from_iv() {
    let mut chain = atm_chain("SPY", 105, 0.5, 0.05);
    chain.contracts.push(OptionContract {
        strike: dec!(105),
        expiry: now() + chrono::Duration::days(60),
        option_type: OptionType::Call,
        last_price: Decimal::ZERO,
        bid: None,
        ask: None,
    });
    let gateway = ScriptedGateway::new(0.05).with(
        "SPY",
        Script {
            closes: closes_mean_100_sd_2(),
            chain: Some(chain),
            ..Script::default()
        },
    );

    let update = evaluate_symbol(&gateway, "SPY", &settings(), &[], now()).await;
    let snapshot = update.outcome.unwrap();
    let estimate = snapshot.iv_estimate.unwrap();
    assert_eq!(estimate.samples, 2);
    assert_eq!(estimate.rejected, 1);
    assert!((estimate.volatility - 0.5).abs() < 1e-3);
    assert_eq!(
        update.signal.map(|s| s.kind),
        Some(SignalKind::LongPutCandidate)
    );
}

#[tokio::test]
async fn only_invalid_quotes_leave_iv_unknown() {
    let mut chain = atm_chain("SPY", 105, 0.5, 0.05);
    for contract in &mut chain.contracts {
        contract.last_price = Decimal::ZERO;
    }
    let gateway = ScriptedGateway::new(0.05).with(
        "SPY",
        Script {
            closes: closes_mean_100_sd_2(),
            chain: Some(chain),
            ..Script::default()
        },
    );

    let update = evaluate_symbol(&gateway, "SPY", &settings(), &[], now()).await;
    let snapshot = update.outcome.unwrap();
    assert!(matches!(
        snapshot.iv_failure,
        Some(ScreenError::InvalidQuote { .. })
    ));
    let signal = update.signal.unwrap();
    assert_eq!(signal.kind, SignalKind::NoSignal);
    assert_eq!(signal.rationale.iv_regime, IvRegime::Unknown);
}

#[tokio::test]
async fn price_inside_bands_is_no_signal_regardless_of_iv() {
    for vol in [0.1, 0.5, 1.5] {
        let gateway = ScriptedGateway::new(0.05).with(
            "SPY",
            Script {
                closes: closes_mean_100_sd_2(),
                chain: Some(atm_chain("SPY", 100, vol, 0.05)),
                ..Script::default()
            },
        );
        let update = evaluate_symbol(&gateway, "SPY", &settings(), &[], now()).await;
        let signal = update.signal.unwrap();
        assert_eq!(signal.kind, SignalKind::NoSignal, "vol {vol}");
        assert_eq!(signal.rationale.band_breach, None);
    }
}

#[tokio::test]
async fn empty_chain_falls_back_to_latest_close() {
    let mut chain = atm_chain("SPY", 105, 0.5, 0.05);
    chain.contracts.clear();
    let gateway = ScriptedGateway::new(0.05).with(
        "SPY",
        Script {
            closes: closes_mean_100_sd_2(),
            chain: Some(chain),
            ..Script::default()
        },
    );

    let update = evaluate_symbol(&gateway, "SPY", &settings(), &[], now()).await;
    let snapshot = update.outcome.as_ref().unwrap();
    assert!(matches!(
        snapshot.iv_failure,
        Some(ScreenError::DataUnavailable { .. })
    ));
    let signal = update.signal.unwrap();
    assert_eq!(signal.kind, SignalKind::NoSignal);
    // Spot comes from the chain even when it lists no contracts.
    assert_eq!(signal.rationale.price, Some(105.0));
}

#[tokio::test]
async fn trailing_reference_can_demote_an_absolute_high_iv() {
    let config = ScreenerConfig {
        iv_trailing_window: Some(3),
        ..ScreenerConfig::default()
    };
    let settings = PipelineSettings::from_config(&config);
    let gateway = ScriptedGateway::new(0.05).with(
        "SPY",
        Script {
            closes: closes_mean_100_sd_2(),
            chain: Some(atm_chain("SPY", 105, 0.5, 0.05)),
            ..Script::default()
        },
    );

    // Recent IV around 0.5: 0.5 is below 0.5 × 1.2.
    let update = evaluate_symbol(&gateway, "SPY", &settings, &[0.5, 0.5, 0.5], now()).await;
    let signal = update.signal.unwrap();
    assert_eq!(signal.kind, SignalKind::NoSignal);
    assert_eq!(signal.rationale.iv_regime, IvRegime::Normal);
    assert!((signal.rationale.iv_reference.unwrap() - 0.6).abs() < 1e-12);
}

#[tokio::test]
async fn committed_update_is_visible_in_registry() {
    let gateway = ScriptedGateway::new(0.05).with(
        "SPY",
        Script {
            closes: closes_mean_100_sd_2(),
            chain: Some(atm_chain("SPY", 105, 0.5, 0.05)),
            ..Script::default()
        },
    );
    let registry = WatchList::new(20, 10);
    registry.add("spy");

    let update = evaluate_symbol(&gateway, "SPY", &settings(), &[], now()).await;
    assert!(registry.apply_result("SPY", update));

    let entry = registry.get("SPY").unwrap();
    assert_eq!(entry.price_history.len(), 20);
    assert_eq!(entry.iv_history.len(), 1);
    assert_eq!(entry.last_updated, Some(now()));
    assert!(entry.last_signal.as_ref().unwrap().is_candidate());
}
