//! Status screen layout for the 240x135 landscape LCD.

use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb565,
    prelude::*,
    text::{Baseline, Text},
};

use opener_common::{display::ERROR_OVERLAY_TEXT, StatusColor, StatusFrame};

const OVERLAY_ORIGIN: Point = Point::new(10, 5);
const LABEL_ORIGIN: Point = Point::new(10, 30);
const BATTERY_ORIGIN: Point = Point::new(10, 80);
const TIME_ORIGIN: Point = Point::new(10, 105);

pub const BOOT_TEXT: &str = "WiFi connecting";

pub fn rgb565(color: StatusColor) -> Rgb565 {
    match color {
        StatusColor::Green => Rgb565::GREEN,
        StatusColor::Red => Rgb565::RED,
        StatusColor::Yellow => Rgb565::YELLOW,
        StatusColor::White => Rgb565::WHITE,
    }
}

fn style(color: Rgb565) -> MonoTextStyle<'static, Rgb565> {
    MonoTextStyle::new(&FONT_10X20, color)
}

fn draw_line<D>(target: &mut D, text: &str, origin: Point, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    Text::with_baseline(text, origin, style(color), Baseline::Top).draw(target)?;
    Ok(())
}

/// Shown once before the network comes up.
pub fn draw_boot<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(Rgb565::BLACK)?;
    draw_line(target, BOOT_TEXT, LABEL_ORIGIN, rgb565(StatusColor::White))
}

/// Full redraw: black background, lock label, battery and time lines, and
/// the yellow error banner while it is active.
pub fn draw_frame<D>(target: &mut D, frame: &StatusFrame) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(Rgb565::BLACK)?;

    if frame.error_overlay {
        draw_line(
            target,
            ERROR_OVERLAY_TEXT,
            OVERLAY_ORIGIN,
            rgb565(StatusColor::Yellow),
        )?;
    }
    draw_line(target, frame.label, LABEL_ORIGIN, rgb565(frame.color))?;
    let details = rgb565(StatusColor::White);
    draw_line(target, &frame.battery_text, BATTERY_ORIGIN, details)?;
    draw_line(target, &frame.time_text, TIME_ORIGIN, details)
}
