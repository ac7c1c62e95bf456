//! Avatar rendering for message authors.

use image::{Rgba, RgbaImage};

use crate::theme::Theme;

/// Rendered avatar surface.
pub type Avatar = RgbaImage;

pub trait AvatarRenderer {
    /// Pure function of `user_id` and `theme`.
    fn generate(&self, user_id: &str, theme: Theme) -> Avatar;
}

/// Number of cells along each side of an identicon.
const GRID: u32 = 5;

/// Symmetric 5x5 identicon derived from the user id.
#[derive(Debug, Clone, Copy)]
pub struct IdenticonRenderer {
    pub cell_size: u32,
}

impl Default for IdenticonRenderer {
    fn default() -> Self {
        Self { cell_size: 8 }
    }
}

impl AvatarRenderer for IdenticonRenderer {
    fn generate(&self, user_id: &str, theme: Theme) -> Avatar {
        let digest = fnv1a(user_id.as_bytes());
        let fg = foreground(digest, theme);
        let bg = background(theme);
        let size = GRID * self.cell_size;
        let mut img = RgbaImage::from_pixel(size, size, bg);

        // Columns 0..3 carry the pattern, 3 and 4 mirror 1 and 0.
        for col in 0..3 {
            for row in 0..GRID {
                let bit = col * GRID + row;
                if (digest >> bit) & 1 == 0 {
                    continue;
                }
                fill_cell(&mut img, col, row, self.cell_size, fg);
                fill_cell(&mut img, GRID - 1 - col, row, self.cell_size, fg);
            }
        }
        img
    }
}

fn fill_cell(img: &mut RgbaImage, col: u32, row: u32, cell: u32, color: Rgba<u8>) {
    for y in row * cell..(row + 1) * cell {
        for x in col * cell..(col + 1) * cell {
            img.put_pixel(x, y, color);
        }
    }
}

fn background(theme: Theme) -> Rgba<u8> {
    match theme {
        Theme::Light => Rgba([0xfa, 0xfa, 0xfa, 0xff]),
        Theme::Dark => Rgba([0x30, 0x30, 0x30, 0xff]),
    }
}

fn foreground(digest: u64, theme: Theme) -> Rgba<u8> {
    let [r, g, b] = [(digest >> 16) as u8, (digest >> 24) as u8, (digest >> 32) as u8];
    match theme {
        // darker tones on light backgrounds, lighter tones on dark ones
        Theme::Light => Rgba([r / 2, g / 2, b / 2, 0xff]),
        Theme::Dark => Rgba([r / 2 + 0x80, g / 2 + 0x80, b / 2 + 0x80, 0xff]),
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}
