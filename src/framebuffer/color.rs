//! Text-mode colors.
use embedded_graphics::pixelcolor::Rgb888;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// The sixteen classic VGA text attributes, in attribute order.
const VGA_PALETTE: [Color; 16] = [
    Color::new(0x00, 0x00, 0x00), // black
    Color::new(0x00, 0x00, 0xAA), // blue
    Color::new(0x00, 0xAA, 0x00), // green
    Color::new(0x00, 0xAA, 0xAA), // cyan
    Color::new(0xAA, 0x00, 0x00), // red
    Color::new(0xAA, 0x00, 0xAA), // magenta
    Color::new(0xAA, 0x55, 0x00), // brown
    Color::new(0xAA, 0xAA, 0xAA), // light gray
    Color::new(0x55, 0x55, 0x55), // dark gray
    Color::new(0x55, 0x55, 0xFF), // light blue
    Color::new(0x55, 0xFF, 0x55), // light green
    Color::new(0x55, 0xFF, 0xFF), // light cyan
    Color::new(0xFF, 0x55, 0x55), // light red
    Color::new(0xFF, 0x55, 0xFF), // light magenta
    Color::new(0xFF, 0xFF, 0x55), // yellow
    Color::new(0xFF, 0xFF, 0xFF), // white
];

impl Color {
    pub const BLACK: Color = VGA_PALETTE[0];
    pub const LIGHT_GRAY: Color = VGA_PALETTE[7];

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Palette entry for a VGA attribute nibble; higher bits are ignored.
    pub const fn vga(index: u8) -> Self {
        VGA_PALETTE[(index & 0x0F) as usize]
    }

    pub fn to_rgb888(self) -> Rgb888 {
        Rgb888::new(self.r, self.g, self.b)
    }
}
