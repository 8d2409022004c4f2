//! Framebuffer writer using embedded-graphics
use bootloader_api::info::{FrameBuffer, PixelFormat};
use embedded_graphics::{pixelcolor::Rgb888, prelude::*};

pub struct FramebufferWriter {
    framebuffer: &'static mut [u8],
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub bytes_per_pixel: usize,
    format: PixelFormat,
}

impl FramebufferWriter {
    pub fn new(fb: &'static mut FrameBuffer) -> Self {
        let info = fb.info();
        Self {
            framebuffer: fb.buffer_mut(),
            width: info.width,
            height: info.height,
            stride: info.stride,
            bytes_per_pixel: info.bytes_per_pixel,
            format: info.pixel_format,
        }
    }

    fn put_pixel(&mut self, x: usize, y: usize, color: Rgb888) {
        let offset = (y * self.stride + x) * self.bytes_per_pixel;
        let Some(px) = self
            .framebuffer
            .get_mut(offset..offset + self.bytes_per_pixel)
        else {
            return;
        };
        match self.format {
            PixelFormat::Rgb => px[..3].copy_from_slice(&[color.r(), color.g(), color.b()]),
            PixelFormat::U8 => {
                let luma = (u16::from(color.r()) * 3 + u16::from(color.g()) * 6 + u16::from(color.b())) / 10;
                px[0] = luma as u8;
            }
            _ => px[..3].copy_from_slice(&[color.b(), color.g(), color.r()]),
        }
    }
}

// Implement DrawTarget for embedded-graphics
impl DrawTarget for FramebufferWriter {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
                continue;
            }
            self.put_pixel(x as usize, y as usize, color);
        }
        Ok(())
    }
}

impl OriginDimensions for FramebufferWriter {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}
