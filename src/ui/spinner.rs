use crate::ui::progress::create_spinner;
use indicatif::ProgressBar;

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        Self {
            pb: create_spinner(message),
        }
    }

    pub fn finish_and_clear(&self) {
        self.pb.finish_and_clear();
    }
}
