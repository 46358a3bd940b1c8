//! `facegate replay`: drive a recorded session through the engine.

use std::path::Path;

use anyhow::{bail, Context, Result};
use facegate_core::Step;
use facegate_engine::{spawn_engine, Config, EngineError, Replay, Trace, VerificationClient};

pub async fn run(
    config: &Config,
    trace_path: &Path,
    image: Option<&Path>,
    address: Option<&str>,
) -> Result<()> {
    let trace = Trace::load(trace_path)?;
    let Replay {
        session,
        extractor,
        decoder,
        frames,
    } = trace.into_replay();
    let session = session.unwrap_or_else(|| config.session_config());

    println!("Replaying {} ({} frames)", trace_path.display(), frames.len());

    let engine = spawn_engine(session, Box::new(extractor), Box::new(decoder))?;
    engine.start().await?;

    for replayed in frames {
        tokio::time::sleep(replayed.delay).await;
        if engine.status().step.is_terminal() {
            break;
        }
        match engine.submit_frame(replayed.frame).await {
            Ok(report) => println!(
                "  frame {:>3}: face={} qr={} -> {}",
                report.seq,
                if report.face_detected { "yes" } else { "no" },
                report.qr.as_deref().unwrap_or("-"),
                report.outcome.step
            ),
            Err(EngineError::Session(e)) => {
                println!("  frame: {e}");
                if e.is_terminal() {
                    break;
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    let status = engine.status();
    let snapshot = engine.snapshot().await?;

    println!();
    println!("Event log:");
    for entry in snapshot.log.iter().rev() {
        println!("  {} {}", entry.at.format("%H:%M:%S%.3f"), entry.message);
    }
    println!();
    println!("Final step: {}", status.step);
    if let Some(err) = &status.last_error {
        println!("Last error: {err}");
    }

    let Some(image) = image else {
        return Ok(());
    };
    if status.step != Step::Success {
        bail!("session ended in {}; nothing to submit", status.step);
    }

    let jpeg = std::fs::read(image)
        .with_context(|| format!("failed to read {}", image.display()))?;
    let client = VerificationClient::new(config)?;
    let verdict = client.submit(jpeg, address).await?;

    println!();
    if verdict.accepted() {
        println!(
            "Verified: user={} score={}",
            verdict.user_id.as_deref().unwrap_or("?"),
            verdict
                .score
                .map(|s| format!("{s:.3}"))
                .unwrap_or_else(|| "-".to_string())
        );
    } else {
        println!(
            "Rejected (code {}): {}",
            verdict.code,
            verdict.msg.as_deref().unwrap_or("no message")
        );
    }

    Ok(())
}
