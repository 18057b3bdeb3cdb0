use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use lambdaflow::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::bar_style())
            .with_message("Initializing...");
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.finish_and_clear();

        Self {
            pb: Arc::new(Mutex::new(pb)),
        }
    }

    /// A bar that counts finished windows; block completions update its message.
    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb_clone = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(pb_guard) = pb_clone.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::RunStart { total_windows } => {
                    pb_guard.reset();
                    pb_guard.set_length(total_windows);
                    pb_guard.set_position(0);
                    pb_guard.set_style(Self::bar_style());
                    pb_guard.set_message("Windows");
                }
                Progress::WindowStart {
                    lambda,
                    total_blocks,
                } => {
                    pb_guard.set_message(format!("λ={:.5} 0/{}", lambda, total_blocks));
                }
                Progress::BlockFinish {
                    lambda,
                    block,
                    total_blocks,
                } => {
                    pb_guard.set_message(format!("λ={:.5} {}/{}", lambda, block, total_blocks));
                }
                Progress::WindowFinish { lambda, succeeded } => {
                    if !succeeded {
                        pb_guard.println(format!("  ✗ Window λ={:.5} failed", lambda));
                    }
                    pb_guard.inc(1);
                }
                Progress::RunFinish => {
                    pb_guard.finish_with_message("✓ Done");
                }
                Progress::Message(msg) => {
                    if !pb_guard.is_finished() {
                        pb_guard.println(format!("  {}", msg));
                    } else {
                        pb_guard.set_message(msg);
                    }
                }
            }
        })
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<20} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("##-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handler_initializes_in_a_clean_state() {
        let handler = CliProgressHandler::new();
        let pb = handler.pb.lock().unwrap();
        assert_eq!(pb.length(), Some(0));
        assert!(pb.is_finished());
    }

    #[test]
    fn callback_tracks_windows_and_blocks() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::RunStart { total_windows: 3 });
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.length(), Some(3));
            assert_eq!(pb.position(), 0);
            assert!(!pb.is_finished());
        }

        callback(Progress::BlockFinish {
            lambda: 0.5,
            block: 2,
            total_blocks: 4,
        });
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.message(), "λ=0.50000 2/4");
        }

        callback(Progress::WindowFinish {
            lambda: 0.5,
            succeeded: true,
        });
        callback(Progress::WindowFinish {
            lambda: 1.0,
            succeeded: false,
        });
        {
            let pb = handler.pb.lock().unwrap();
            assert_eq!(pb.position(), 2);
        }

        callback(Progress::RunFinish);
        {
            let pb = handler.pb.lock().unwrap();
            assert!(pb.is_finished());
            assert_eq!(pb.message(), "✓ Done");
        }
    }

    #[test]
    fn callback_is_thread_safe() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::RunStart { total_windows: 1 });
            callback(Progress::WindowFinish {
                lambda: 0.0,
                succeeded: true,
            });
            callback(Progress::RunFinish);
        })
        .join()
        .unwrap();

        let pb = handler.pb.lock().unwrap();
        assert!(pb.is_finished());
        assert_eq!(pb.position(), 1);
    }
}
