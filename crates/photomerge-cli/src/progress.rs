use indicatif::{ProgressBar, ProgressStyle};
use photomerge_core::pipeline::MergeStage;

/// Progress bar fed from worker progress events.
pub struct StageBar {
    bar: ProgressBar,
    stage: Option<MergeStage>,
}

impl StageBar {
    pub fn new() -> anyhow::Result<Self> {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:20} [{bar:40}] {pos}%")?
                .progress_chars("=> "),
        );
        Ok(Self { bar, stage: None })
    }

    pub fn update(&mut self, stage: MergeStage, done: usize, total: Option<usize>) {
        if self.stage != Some(stage) {
            self.stage = Some(stage);
            self.bar.set_message(stage.to_string());
        }
        let pos = match total {
            Some(t) if t > 0 => (done.min(t) * 100 / t) as u64,
            _ => 0,
        };
        self.bar.set_position(pos);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
