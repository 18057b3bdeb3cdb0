#[derive(Debug, Clone)]
pub enum Progress {
    RunStart { total_windows: u64 },
    WindowStart { lambda: f64, total_blocks: u64 },
    BlockFinish { lambda: f64, block: u64, total_blocks: u64 },
    WindowFinish { lambda: f64, succeeded: bool },
    RunFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
