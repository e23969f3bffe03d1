//! Strategy chain behavior against a scripted channel.

use herald_core::{AttachmentFallback, CampaignStatus, DeliveryError, EngineConfig};
use herald_delivery::{
    AttemptContext, DeliveryRequest, DeliveryVerdict, StrategyChain,
};
use herald_events::ControlSignal;
use herald_test_utils::fixtures::{identifier, pdf_attachment, test_config};
use herald_test_utils::ScriptedChannel;
use std::sync::Arc;
use std::time::Duration;

fn context(channel: &ScriptedChannel, config: EngineConfig, signal: &ControlSignal) -> AttemptContext {
    AttemptContext::new(Arc::new(channel.clone()), Arc::new(config), signal.handle())
}

fn running() -> ControlSignal {
    ControlSignal::new(CampaignStatus::Running)
}

#[tokio::test(start_paused = true)]
async fn test_fast_path_delivers() {
    let channel = ScriptedChannel::new();
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);
    let chain = StrategyChain::standard();

    let report = chain
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert!(report.is_delivered());
    assert_eq!(report.strategy, Some("fast_path"));
    assert!(report.confirmed);
    assert_eq!(channel.sent(), vec![identifier(1)]);
    assert_eq!(channel.calls_to("open_conversation"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unready_fast_path_falls_back_and_stays_disabled() {
    let channel = ScriptedChannel::new().with_fast_path(false);
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);
    let chain = StrategyChain::standard();

    let first = chain
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;
    let second = chain
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(2), "hi"))
        .await;

    assert_eq!(first.strategy, Some("navigation"));
    assert_eq!(second.strategy, Some("navigation"));
    assert_eq!(channel.calls_to("attempt_deliver"), 0);
    assert_eq!(channel.sent(), vec![identifier(1), identifier(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_fast_path_error_falls_through_to_navigation() {
    let channel = ScriptedChannel::new().fail_fast_path(
        &identifier(1),
        DeliveryError::Unavailable {
            reason: "bridge disconnected".to_string(),
        },
    );
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);

    let report = StrategyChain::standard()
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert!(report.is_delivered());
    assert_eq!(report.strategy, Some("navigation"));
    assert_eq!(channel.calls_to("click_send"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_number_is_final_failure() {
    let channel = ScriptedChannel::new().invalid_number(&identifier(1));
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);

    let report = StrategyChain::standard()
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert_eq!(report.verdict, DeliveryVerdict::Failed);
    assert_eq!(report.strategy, Some("fast_path"));
    assert_eq!(report.reason.as_deref(), Some("recipient flagged invalid"));
    assert!(channel.sent().is_empty());
    assert_eq!(channel.calls_to("attempt_deliver"), 0);
    assert_eq!(channel.calls_to("open_conversation"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_number_detected_before_send_on_navigation() {
    let channel = ScriptedChannel::new()
        .with_fast_path(false)
        .invalid_number(&identifier(1));
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);

    let report = StrategyChain::standard()
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert_eq!(report.verdict, DeliveryVerdict::Failed);
    assert_eq!(report.reason.as_deref(), Some("recipient flagged invalid"));
    assert_eq!(channel.calls_to("click_send"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_after_send_is_failure() {
    let channel = ScriptedChannel::new().invalid_after_send(&identifier(1));
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);

    let report = StrategyChain::standard()
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert_eq!(report.verdict, DeliveryVerdict::Failed);
    assert_eq!(
        report.reason.as_deref(),
        Some("recipient flagged invalid after send")
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_send_controls_uses_manual_emulation() {
    let channel = ScriptedChannel::new()
        .with_fast_path(false)
        .missing_send_controls();
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);

    let report = StrategyChain::standard()
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert!(report.is_delivered());
    assert_eq!(report.strategy, Some("manual_emulation"));
    assert_eq!(channel.calls_to("emulate_send"), 1);
    assert_eq!(channel.sent(), vec![identifier(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_text_send_counts_as_delivered() {
    let channel = ScriptedChannel::new()
        .with_fast_path(false)
        .unconfirmed_sends();
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);

    let report = StrategyChain::standard()
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert!(report.is_delivered());
    assert!(!report.confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_attachment_failure_fails_closed_by_default() {
    let channel = ScriptedChannel::new()
        .with_fast_path(false)
        .failing_attach();
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);
    let request =
        DeliveryRequest::new(identifier(1), "hi").with_attachment(Some(pdf_attachment()));

    let report = StrategyChain::standard().deliver(&mut ctx, &request).await;

    assert_eq!(report.verdict, DeliveryVerdict::Failed);
    assert_eq!(report.strategy, Some("navigation"));
    assert_eq!(channel.calls_to("attach"), 3);
    assert_eq!(channel.calls_to("click_send"), 0);
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_attachment_failure_degrades_to_text_when_allowed() {
    let channel = ScriptedChannel::new()
        .with_fast_path(false)
        .failing_attach();
    let signal = running();
    let config = EngineConfig {
        attachment_fallback: AttachmentFallback::TextOnly,
        ..test_config()
    };
    let mut ctx = context(&channel, config, &signal);
    let request =
        DeliveryRequest::new(identifier(1), "hi").with_attachment(Some(pdf_attachment()));

    let report = StrategyChain::standard().deliver(&mut ctx, &request).await;

    assert!(report.is_delivered());
    assert!(report.degraded);
    assert_eq!(report.reason.as_deref(), Some("attachment dropped"));
    assert_eq!(channel.sent(), vec![identifier(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_attachment_with_empty_message_is_not_sent() {
    let channel = ScriptedChannel::new()
        .with_fast_path(false)
        .failing_attach();
    let signal = running();
    let config = EngineConfig {
        attachment_fallback: AttachmentFallback::TextOnly,
        ..test_config()
    };
    let mut ctx = context(&channel, config, &signal);
    let request =
        DeliveryRequest::new(identifier(1), "  ").with_attachment(Some(pdf_attachment()));

    let report = StrategyChain::standard().deliver(&mut ctx, &request).await;

    assert_eq!(report.verdict, DeliveryVerdict::Failed);
    assert_eq!(
        report.reason.as_deref(),
        Some("attachment dropped and message is empty")
    );
    assert_eq!(channel.calls_to("click_send"), 0);
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_attachment_uses_first_working_technique() {
    let channel = ScriptedChannel::new().with_fast_path(false);
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);
    let request =
        DeliveryRequest::new(identifier(1), "hi").with_attachment(Some(pdf_attachment()));

    let report = StrategyChain::standard().deliver(&mut ctx, &request).await;

    assert!(report.is_delivered());
    assert!(!report.degraded);
    assert_eq!(channel.attached().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_retries_missing_elements() {
    let channel = ScriptedChannel::new()
        .with_fast_path(false)
        .missing_elements(2);
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);

    let report = StrategyChain::standard()
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert!(report.is_delivered());
    assert_eq!(channel.calls_to("open_conversation"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_gives_up_after_retries() {
    let channel = ScriptedChannel::new()
        .with_fast_path(false)
        .missing_elements(5);
    let signal = running();
    let mut ctx = context(&channel, test_config(), &signal);

    let report = StrategyChain::standard()
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert_eq!(report.verdict, DeliveryVerdict::Failed);
    assert_eq!(channel.calls_to("open_conversation"), 3);
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_abort_interrupts_validity_probe() {
    let channel = ScriptedChannel::new().with_fast_path(false);
    let signal = running();
    let config = EngineConfig {
        validity_timeout: Duration::from_secs(30),
        ..test_config()
    };
    let mut ctx = context(&channel, config, &signal);
    let chain = StrategyChain::standard();
    let request = DeliveryRequest::new(identifier(1), "hi");

    let abort_later = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        signal.set(CampaignStatus::Aborted);
    };
    let (report, ()) = tokio::join!(chain.deliver(&mut ctx, &request), abort_later);

    assert!(report.is_aborted());
    assert_eq!(channel.calls_to("click_send"), 0);
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pause_does_not_interrupt_an_attempt() {
    let channel = ScriptedChannel::new().with_fast_path(false);
    let signal = running();
    let config = EngineConfig {
        validity_timeout: Duration::from_secs(5),
        ..test_config()
    };
    let mut ctx = context(&channel, config, &signal);
    let chain = StrategyChain::standard();
    let request = DeliveryRequest::new(identifier(1), "hi");

    let pause_later = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        signal.set(CampaignStatus::Paused);
    };
    let (report, ()) = tokio::join!(chain.deliver(&mut ctx, &request), pause_later);

    assert!(report.is_delivered());
    assert_eq!(channel.sent(), vec![identifier(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_hung_channel_calls_time_out_as_failure() {
    let channel = ScriptedChannel::new().slow_on(&identifier(1), Duration::from_secs(3600));
    let signal = running();
    let config = test_config();
    let bound = config.channel_call_timeout;
    let mut ctx = context(&channel, config, &signal);
    let started = tokio::time::Instant::now();

    let report = StrategyChain::standard()
        .deliver(&mut ctx, &DeliveryRequest::new(identifier(1), "hi"))
        .await;

    assert_eq!(report.verdict, DeliveryVerdict::Failed);
    assert!(report
        .reason
        .as_deref()
        .unwrap_or_default()
        .contains("timed out"));
    assert!(channel.sent().is_empty());
    assert_eq!(channel.calls_to("attempt_deliver"), 1);
    assert!(started.elapsed() < Duration::from_secs(3600));
    assert!(started.elapsed() >= bound);
}
