use super::*;

#[derive(Clone)]
pub struct Thread {
    diagnostics: DiagnosticsService,
}

impl Thread {
    async fn run_once(&self) {
        self.diagnostics.poll_peers().await;
    }

    fn do_loop(self, initial_delay: Duration, poll_interval: Duration) -> ThreadHandle {
        let fut = async move {
            // Let a normal master handover complete before the first poll.
            tokio::time::sleep(initial_delay).await;
            let mut interval = tokio::time::interval(poll_interval);
            // Fixed delay between poll rounds, not fixed rate.
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.run_once().await;
            }
        };
        let hdl = tokio::spawn(fut).abort_handle();
        ThreadHandle(hdl)
    }
}

pub fn new(
    diagnostics: DiagnosticsService,
    initial_delay: Duration,
    poll_interval: Duration,
) -> ThreadHandle {
    Thread { diagnostics }.do_loop(initial_delay, poll_interval)
}
