// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod common;

use std::time::Duration;

use serde_json::{json, Value};
use tokio::time;

use common::{harness, harness_with, Call, Reply};
use zcoord_core::nv::{
    ZCD_NV_CHANLIST, ZCD_NV_PANID, ZCD_NV_PRECFGKEY, ZCD_NV_PRECFGKEYS_ENABLE,
    ZCD_NV_STARTUP_OPTION,
};
use zcoord_core::{ControllerConfig, ControllerError, ResetMode, TransportError};

/// The step name of a hard-reset request, as written to firmware.
fn step(call: &Call) -> String {
    match call.key.as_str() {
        "SAPI:writeConfiguration" => format!("write:{}", call.args["configid"]),
        "SYS:osalNvWrite" => format!("osal:{}", call.args["id"]),
        other => other.to_string(),
    }
}

fn bytes(call: &Call) -> Vec<u64> {
    call.args["value"]
        .as_array()
        .map(|v| v.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn hard_reset_writes_in_firmware_order() {
    let h = harness();
    h.controller.reset(ResetMode::Hard).await.expect("hard reset");

    let calls = h.transport.calls();
    let steps: Vec<String> = calls.iter().map(step).collect();
    assert_eq!(
        steps,
        vec![
            "SYS:resetReq",
            "write:3",   // startup option
            "SYS:resetReq",
            "write:131", // pan id
            "write:45",  // extended pan id
            "write:132", // channel list
            "write:135", // logical type
            "write:98",  // precfgkey
            "write:99",  // precfgkeys enable
            "osal:100",  // security mode
            "write:143", // zdo direct cb
        ]
    );

    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].at - w[0].at).collect();
    assert_eq!(gaps[0], Duration::ZERO);
    assert!(gaps[1..].iter().all(|gap| *gap == Duration::from_millis(10)));

    assert_eq!(calls[0].args, json!({ "type": 1 }));
    assert!(!h.controller.is_resetting());
}

#[tokio::test(start_paused = true)]
async fn soft_reset_waits_for_indication() {
    let h = harness();
    h.controller.reset(ResetMode::Soft).await.expect("soft reset");
    assert_eq!(h.transport.keys(), vec!["SYS:resetReq"]);
    assert!(!h.controller.is_resetting());
}

#[tokio::test(start_paused = true)]
async fn resetting_flag_spans_the_sequence() {
    let h = harness();
    let controller = h.controller.clone();
    let reset = tokio::spawn(async move { controller.reset(ResetMode::Hard).await });

    time::sleep(Duration::from_millis(25)).await;
    assert!(h.controller.is_resetting());

    reset.await.expect("join").expect("hard reset");
    assert!(!h.controller.is_resetting());
}

#[tokio::test(start_paused = true)]
async fn missing_indication_times_out() {
    let h = harness();
    h.transport.set_reset_indications(false);

    let started = time::Instant::now();
    let err = h.controller.reset(ResetMode::Soft).await.unwrap_err();
    assert!(matches!(err, ControllerError::ResetTimeout));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert!(!h.controller.is_resetting());
}

#[tokio::test(start_paused = true)]
async fn late_indications_still_complete_hard_reset() {
    let h = harness();
    h.transport.set_reset_indication_delay(Duration::from_millis(15));
    h.controller.reset(ResetMode::Hard).await.expect("hard reset");
    assert!(!h.controller.is_resetting());
}

#[tokio::test(start_paused = true)]
async fn hard_reset_needs_an_indication_per_reset_request() {
    let h = harness();
    // The first reset confirms only after the second request went out.
    h.transport.set_reset_indication_delay(Duration::from_millis(15));
    h.transport.limit_reset_indications(1);

    let err = h.controller.reset(ResetMode::Hard).await.unwrap_err();
    assert!(matches!(err, ControllerError::ResetTimeout));
    assert_eq!(h.transport.count("SYS:resetReq"), 2);
    assert!(!h.controller.is_resetting());
}

#[tokio::test(start_paused = true)]
async fn failing_step_aborts_remaining_sequence() {
    let h = harness();
    h.transport.script("SAPI:writeConfiguration", Reply::Value(json!({ "status": 0 })));
    h.transport.script("SAPI:writeConfiguration", Reply::Error(TransportError::Timeout));

    let err = h.controller.reset(ResetMode::Hard).await.unwrap_err();
    match &err {
        ControllerError::SequenceAborted { step, source } => {
            assert_eq!(*step, "panId");
            assert!(source.is_timeout());
        }
        other => panic!("unexpected error: {other}"),
    }
    // resetReq, startupOption, resetReq, panId
    assert_eq!(h.transport.calls().len(), 4);
    assert!(!h.controller.is_resetting());
}

#[tokio::test(start_paused = true)]
async fn configured_params_reach_firmware() {
    let mut config = ControllerConfig::default();
    config.net.pan_id = Some(0x1a62);
    config.net.channel_list = Some(vec![11, 25]);
    let h = harness_with(&config);

    h.controller.reset(ResetMode::Hard).await.expect("hard reset");
    let writes = h.transport.calls();
    let pan = writes
        .iter()
        .find(|c| c.args["configid"] == json!(ZCD_NV_PANID))
        .expect("pan id write");
    assert_eq!(bytes(pan), vec![0x62, 0x1a]);
    let channels = writes
        .iter()
        .find(|c| c.args["configid"] == json!(ZCD_NV_CHANLIST))
        .expect("channel write");
    assert_eq!(bytes(channels), vec![0x00, 0x08, 0x00, 0x02]);
}

#[tokio::test(start_paused = true)]
async fn nv_mismatch_triggers_one_hard_reset() {
    let h = harness();
    // Firmware holds a different PAN id; the other items match.
    let nv = h.controller.nv_config();
    h.transport.store_nv(ZCD_NV_PANID, &[0x34, 0x12]);
    h.transport.store_nv(ZCD_NV_CHANLIST, &nv.channel_list.value);
    h.transport.store_nv(ZCD_NV_PRECFGKEY, &nv.precfgkey.value);
    h.transport.store_nv(ZCD_NV_PRECFGKEYS_ENABLE, &nv.precfgkeys_enable.value);
    assert!(!h.controller.is_config_dirty());

    h.controller.check_nv_params().await.expect("nv check");

    assert_eq!(h.transport.count("SAPI:readConfiguration"), 1);
    assert_eq!(h.transport.count("SYS:resetReq"), 2);
    let startup = h
        .transport
        .calls()
        .into_iter()
        .find(|c| c.args["configid"] == json!(ZCD_NV_STARTUP_OPTION))
        .expect("startup option write");
    // Dirty at the start of the reset: clear-state forced for this run only.
    assert_eq!(bytes(&startup), vec![0x02]);

    assert!(!h.controller.is_config_dirty());
    assert_eq!(h.controller.nv_config().startup_option.value, vec![0x00]);

    // The rewrite converged: a second check reads everything and stays put.
    h.transport.clear_calls();
    h.controller.check_nv_params().await.expect("second check");
    assert_eq!(h.transport.count("SAPI:readConfiguration"), 4);
    assert_eq!(h.transport.count("SYS:resetReq"), 0);
}

#[tokio::test(start_paused = true)]
async fn nv_reads_are_spaced_by_step_delay() {
    let h = harness();
    let nv = h.controller.nv_config();
    for (_, item) in nv.verified_items() {
        h.transport.store_nv(item.id, &item.value);
    }

    h.controller.check_nv_params().await.expect("nv check");
    let calls = h.transport.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls
        .windows(2)
        .all(|w| w[1].at - w[0].at == Duration::from_millis(10)));
}

#[tokio::test(start_paused = true)]
async fn missing_nv_item_triggers_hard_reset() {
    let h = harness();
    h.controller.check_nv_params().await.expect("nv check");
    assert_eq!(h.transport.count("SAPI:readConfiguration"), 1);
    assert_eq!(h.transport.count("SYS:resetReq"), 2);
    assert!(!h.controller.is_config_dirty());
}

#[tokio::test(start_paused = true)]
async fn other_read_errors_propagate() {
    let h = harness();
    h.transport.script(
        "SAPI:readConfiguration",
        Reply::Value(json!({ "status": 0x0a })),
    );
    let err = h.controller.check_nv_params().await.unwrap_err();
    assert_eq!(err.status(), Some(0x0a));
    assert_eq!(h.transport.count("SYS:resetReq"), 0);
    assert!(!h.controller.is_config_dirty());
}

#[tokio::test(start_paused = true)]
async fn failed_rewrite_keeps_config_dirty() {
    let h = harness();
    h.transport.set_reset_indications(false);

    let err = h.controller.check_nv_params().await.unwrap_err();
    assert!(matches!(err, ControllerError::ResetTimeout));
    assert!(h.controller.is_config_dirty());
    assert_eq!(h.controller.nv_config().startup_option.value, vec![0x00]);
}

#[tokio::test(start_paused = true)]
async fn set_nv_params_validates_input() {
    let h = harness();
    h.controller
        .set_nv_params(&json!({ "panId": 0x2222, "startoptClearState": true }))
        .expect("valid params");
    let nv = h.controller.nv_config();
    assert_eq!(nv.pan_id.value, vec![0x22, 0x22]);
    assert_eq!(nv.startup_option.value, vec![0x02]);

    for bad in [
        json!({ "precfgkey": [1, 2, 3] }),
        json!({ "channel": 11 }),
        json!({ "panId": "big" }),
        json!([11]),
    ] {
        let err = h.controller.set_nv_params(&bad).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidArgument(_)), "{bad}");
    }
    assert_eq!(h.controller.nv_config().pan_id.value, vec![0x22, 0x22]);
}
