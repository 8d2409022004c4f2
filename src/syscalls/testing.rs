//! Console stand-in for host tests.

use std::collections::VecDeque;

use super::Devices;

#[derive(Debug, Default)]
pub struct RecordingDevices {
    pub output: Vec<u8>,
    /// Served by `get_char`.
    pub input: VecDeque<u8>,
    pub colors: Vec<(u8, u8)>,
    pub clears: usize,
    pub ticks: u64,
}

impl Devices for RecordingDevices {
    fn put_char(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn get_char(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn set_text_color(&mut self, fg: u8, bg: u8) {
        self.colors.push((fg, bg));
    }

    fn clear_screen(&mut self) {
        self.clears += 1;
    }

    fn tick_count(&self) -> u64 {
        self.ticks
    }
}
