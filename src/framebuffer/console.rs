//! Character grid on top of any RGB draw target.
//!
//! Cells are 8x13 pixels (`FONT_8X13`). Output wraps at the right edge;
//! when the cursor runs off the bottom the screen is cleared and writing
//! starts again at the top.

use embedded_graphics::{
    mono_font::{ascii::FONT_8X13, MonoTextStyleBuilder},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};

use super::color::Color;

const CELL_W: u32 = 8;
const CELL_H: u32 = 13;

pub struct TextScreen<T> {
    target: T,
    cols: u32,
    rows: u32,
    col: u32,
    row: u32,
    fg: Color,
    bg: Color,
}

impl<T> TextScreen<T>
where
    T: DrawTarget<Color = Rgb888> + OriginDimensions,
{
    pub fn new(target: T) -> Self {
        let size = target.size();
        let mut screen = Self {
            cols: (size.width / CELL_W).max(1),
            rows: (size.height / CELL_H).max(1),
            target,
            col: 0,
            row: 0,
            fg: Color::LIGHT_GRAY,
            bg: Color::BLACK,
        };
        screen.clear();
        screen
    }

    pub fn cursor(&self) -> (u32, u32) {
        (self.col, self.row)
    }

    pub fn set_color(&mut self, fg: Color, bg: Color) {
        self.fg = fg;
        self.bg = bg;
    }

    /// Fill with the background color and home the cursor.
    pub fn clear(&mut self) {
        let bg = self.bg.to_rgb888();
        let _ = self.target.clear(bg);
        self.col = 0;
        self.row = 0;
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.newline(),
            b'\r' => self.col = 0,
            0x08 => {
                if self.col > 0 {
                    self.col -= 1;
                    self.draw_cell(b' ');
                }
            }
            b'\t' => {
                for _ in 0..4 - self.col % 4 {
                    self.write_byte(b' ');
                }
            }
            0x20..=0x7e => {
                self.draw_cell(byte);
                self.col += 1;
                if self.col == self.cols {
                    self.newline();
                }
            }
            _ => self.write_byte(b'?'),
        }
    }

    fn newline(&mut self) {
        self.col = 0;
        self.row += 1;
        if self.row == self.rows {
            self.clear();
        }
    }

    fn draw_cell(&mut self, byte: u8) {
        let origin = Point::new((self.col * CELL_W) as i32, (self.row * CELL_H) as i32);
        let _ = Rectangle::new(origin, Size::new(CELL_W, CELL_H))
            .into_styled(PrimitiveStyle::with_fill(self.bg.to_rgb888()))
            .draw(&mut self.target);

        let style = MonoTextStyleBuilder::new()
            .font(&FONT_8X13)
            .text_color(self.fg.to_rgb888())
            .build();
        let glyph = [byte];
        let text = core::str::from_utf8(&glyph).unwrap_or("?");
        let _ = Text::with_baseline(text, origin, style, Baseline::Top).draw(&mut self.target);
    }
}
