use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::core::error::RenderError;
use crate::core::session::PageSession;

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const SETTLE_DELAY: Duration = Duration::from_millis(150);

/// Waits for the rendered application to declare itself ready for capture.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessDetector {
    timeout: Duration,
    poll_interval: Duration,
    settle_delay: Duration,
}

impl Default for ReadinessDetector {
    fn default() -> Self {
        Self::new(DEFAULT_READY_TIMEOUT)
    }
}

impl ReadinessDetector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: POLL_INTERVAL,
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn wait_until_ready(&self, session: &mut dyn PageSession) -> Result<(), RenderError> {
        // Fonts are not part of the budget: capturing before they load is wrong output.
        session.wait_for_fonts().await?;

        match time::timeout(self.timeout, self.poll_ready_flag(session)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RenderError::ReadyFlagTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        }

        time::sleep(self.settle_delay).await;
        Ok(())
    }

    async fn poll_ready_flag(&self, session: &mut dyn PageSession) -> Result<(), RenderError> {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        loop {
            ticker.tick().await;
            attempts += 1;

            if session.ready_flag().await? {
                tracing::debug!("Render ready after {} attempts", attempts);
                return Ok(());
            }

            if let Some(err) = session.render_error().await? {
                return Err(RenderError::RenderFailed(format!(
                    "page reported a render error: {}",
                    err
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::{ImageCaptureOptions, PdfCaptureOptions};
    use async_trait::async_trait;
    use tokio::time::Instant;

    #[derive(Default)]
    struct ScriptedPage {
        ready_after_polls: Option<u32>,
        page_error: Option<String>,
        polls: u32,
        fonts_waited: bool,
    }

    #[async_trait]
    impl PageSession for ScriptedPage {
        async fn emulate_reduced_motion(&mut self) -> Result<(), RenderError> {
            Ok(())
        }

        async fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<(), RenderError> {
            Ok(())
        }

        async fn wait_for_fonts(&mut self) -> Result<(), RenderError> {
            // Font loading is slow but must not eat into the ready budget.
            time::sleep(Duration::from_secs(30)).await;
            self.fonts_waited = true;
            Ok(())
        }

        async fn ready_flag(&mut self) -> Result<bool, RenderError> {
            assert!(self.fonts_waited, "polled before fonts were ready");
            self.polls += 1;
            Ok(self.ready_after_polls.is_some_and(|n| self.polls >= n))
        }

        async fn render_error(&mut self) -> Result<Option<String>, RenderError> {
            Ok(self.page_error.clone())
        }

        async fn capture_pdf(&mut self, _: &PdfCaptureOptions) -> Result<Vec<u8>, RenderError> {
            unreachable!()
        }

        async fn capture_image(&mut self, _: &ImageCaptureOptions) -> Result<Vec<u8>, RenderError> {
            unreachable!()
        }

        async fn close(&mut self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn ready_flag_never_set_times_out_with_default_budget() {
        let mut page = ScriptedPage::default();
        let started = Instant::now();

        let err = ReadinessDetector::default()
            .wait_until_ready(&mut page)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RenderError::ReadyFlagTimeout { timeout_ms: 10_000 }
        ));
        assert_eq!(started.elapsed(), Duration::from_secs(40));
        assert!(page.polls >= 100);
    }

    #[tokio::test(start_paused = true)]
    async fn success_returns_after_settle_delay() {
        let mut page = ScriptedPage {
            ready_after_polls: Some(3),
            ..Default::default()
        };
        let started = Instant::now();

        ReadinessDetector::default()
            .wait_until_ready(&mut page)
            .await
            .unwrap();

        // 30s fonts, first tick immediate then two 100ms ticks, then settle.
        assert_eq!(
            started.elapsed(),
            Duration::from_secs(30) + Duration::from_millis(200) + SETTLE_DELAY
        );
        assert_eq!(page.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn page_error_fails_fast() {
        let mut page = ScriptedPage {
            page_error: Some("chart data missing".to_string()),
            ..Default::default()
        };

        let err = ReadinessDetector::default()
            .wait_until_ready(&mut page)
            .await
            .unwrap_err();

        match err {
            RenderError::RenderFailed(msg) => assert!(msg.contains("chart data missing")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(page.polls, 1);
    }
}
