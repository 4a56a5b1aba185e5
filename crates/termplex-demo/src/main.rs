//! Architecture walk-through: build a session tree, run an interactive and
//! a background shell in one pane, consume the multiplexed output stream,
//! and tear everything down.
//!
//! Set `TERMPLEX_DEBUG=1` for debug lines on stderr.

use std::time::Duration;

use termplex::SessionManager;
use termplex_common::id;

#[tokio::main]
async fn main() {
    termplex_common::init_debug_logging();
    tracing::info!("termplex demo v{} starting", env!("CARGO_PKG_VERSION"));

    // Top-level manager: up to 5 windows per session.
    let manager = SessionManager::new(5);

    let session_id = manager
        .create_session("DemoProject", None)
        .expect("failed to create session");
    let window_id = manager
        .add_window(&session_id, "MainWindow", None)
        .expect("failed to add window");
    let window = manager.get_window(&window_id).expect("window just added");
    let pane_id = window.add_pane(Some("main")).expect("failed to add pane");
    let pane = window.get_pane(&pane_id).expect("pane just added");

    // Consume all multiplexed output from the pane in the background.
    let mut output_rx = pane.take_output().expect("fresh pane has a subscriber");
    let consumer = tokio::spawn(async move {
        println!("--- listening for all output from pane ---");
        while let Some(record) = output_rx.recv().await {
            let stream = if record.is_stderr { "STDERR" } else { "STDOUT" };
            print!(
                "[pane output | shell ..{} | {stream}]: {}",
                id::short(&record.shell_id),
                String::from_utf8_lossy(&record.data)
            );
        }
        println!("--- pane output stream closed ---");
    });

    // One interactive shell and one background task, side by side.
    let interactive = pane
        .spawn_shell(true, &["bash", "-i"])
        .await
        .expect("failed to spawn interactive shell");

    pane.spawn_shell(
        false,
        &[
            "bash",
            "-c",
            "echo 'Background task starting...'; sleep 1; echo 'Background task finished.'",
        ],
    )
    .await
    .expect("failed to spawn background shell");

    // Synchronous round-trip over the interactive shell.
    tokio::time::sleep(Duration::from_millis(200)).await;
    match interactive
        .send_command_and_wait("echo 'Hello from the interactive shell!'")
        .await
    {
        Ok(output) => println!("--- synchronous response: {}", output.trim_end()),
        Err(e) => eprintln!("synchronous command failed: {e}"),
    }

    // Let the background task run its course.
    tokio::time::sleep(Duration::from_secs(2)).await;

    // Cascade teardown: session -> window -> pane -> shells.
    println!("--- terminating session ---");
    if let Err(e) = manager.terminate_session(&session_id).await {
        eprintln!("session teardown failed: {e}");
    }

    let _ = consumer.await;
    tracing::info!("demo finished");
}
