//! A faulting channel pauses alone while the rest of the fleet keeps ticking

use std::time::Duration;
use telesim::{ChannelDefinition, ChannelKey, GenerationFault};
use telesim_emulator::*;

fn fleet() -> EmulatorConfig {
    // the span overflows to infinity, so the noise deviation is unusable
    let broken = ChannelDefinition::float("broken", -1.0e308, 1.0e308).with_noise(0.5);
    let healthy = ChannelDefinition::float("healthy", 0.0, 100.0)
        .with_change_step(1.0)
        .with_unit("%");

    EmulatorConfig {
        config_name: "faults".to_string(),
        description: None,
        devices: vec![DeviceDefinition::new("dev", "Device", DeviceType::Sensor)
            .with_channel(broken)
            .with_channel(healthy)],
    }
}

#[tokio::test(start_paused = true)]
async fn faulted_channel_does_not_stop_others() {
    let (mut emulator, mut events) = Emulator::new(fleet(), EmulatorSettings::seeded(7)).unwrap();
    assert_eq!(emulator.start(), 2);

    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let broken = ChannelKey::new("dev", "broken");
    let healthy = ChannelKey::new("dev", "healthy");

    match events.recv().await {
        Some(SchedulerEvent::Faulted { key, fault, ticks }) => {
            assert_eq!(key, broken);
            assert_eq!(ticks, 0);
            assert!(matches!(fault, GenerationFault::NonFinite { stage: "noise", .. }));
        }
        other => panic!("expected a fault event, got {:?}", other),
    }

    assert!(matches!(
        emulator.channel_status(&broken),
        Some(ChannelStatus::Faulted { .. })
    ));
    assert_eq!(emulator.channel_status(&healthy), Some(ChannelStatus::Running));

    let store = emulator.store();
    assert!(store.latest(&broken).is_none());
    assert_eq!(store.history(&healthy).len(), 3);
    assert_eq!(emulator.running_count(), 1);

    emulator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn faulted_channel_restarts_with_fresh_state() {
    let (mut emulator, _events) = Emulator::new(fleet(), EmulatorSettings::seeded(7)).unwrap();
    emulator.start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let broken = ChannelKey::new("dev", "broken");
    emulator.restart_channel(&broken).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // same definition, same fault
    assert!(matches!(
        emulator.channel_status(&broken),
        Some(ChannelStatus::Faulted { .. })
    ));
    emulator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn readings_carry_unit_and_increasing_timestamps() {
    let (mut emulator, _events) = Emulator::new(fleet(), EmulatorSettings::seeded(3)).unwrap();
    emulator.start();
    tokio::time::sleep(Duration::from_millis(5_500)).await;

    let history = emulator.store().history(&ChannelKey::new("dev", "healthy"));
    assert_eq!(history.len(), 6);
    assert!(history.iter().all(|r| r.unit == "%"));
    assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    for pair in history.windows(2) {
        let a = pair[0].value.as_f64().unwrap();
        let b = pair[1].value.as_f64().unwrap();
        assert!((b - a).abs() <= 1.0 + 1e-9);
    }

    emulator.stop().await;
}
