//! The animated demo scene.
//!
//! Every sender owns one arc of a rotating rose curve and draws it into the
//! shared main window. The host also keeps a file-only caption window.

use std::f64::consts::TAU;

use vgs_core::{Feedback, Sender, VgsError, WindowSinks};

use crate::config::SceneConfig;

pub const MAIN_WINDOW: u32 = 1;
pub const CAPTION_WINDOW: u32 = 2;

const PETALS: f64 = 5.0;
const RADIUS: f64 = 100.0;

/// Points of this rank's arc in `frame`.
pub fn arc(frame: u32, rank: u32, senders: u32, points: u32) -> Vec<(f64, f64)> {
    let senders = senders.max(1);
    let span = TAU / f64::from(senders);
    let start = span * f64::from(rank);
    let spin = f64::from(frame) * 0.05;
    let steps = points.max(2);
    (0..steps)
        .map(|i| {
            let t = start + span * f64::from(i) / f64::from(steps - 1);
            let r = RADIUS * (PETALS * t).cos();
            (r * (t + spin).cos(), r * (t + spin).sin())
        })
        .collect()
}

pub fn palette(rank: u32) -> u32 {
    1 + rank % 15
}

/// Draw the whole run for one sender and return the last feedback.
pub async fn animate(mut sender: Sender, scene: SceneConfig) -> Result<Feedback, VgsError> {
    let rank = sender.rank();
    sender.start().await?;
    sender.open_window(MAIN_WINDOW, WindowSinks::default()).await?;
    if scene.caption {
        sender.open_window(CAPTION_WINDOW, WindowSinks::file_only()).await?;
    }

    for frame in 0..scene.frames {
        sender.begin_frame(MAIN_WINDOW).await?;
        sender.set_color(MAIN_WINDOW, palette(rank)).await?;

        // The arc is one polyline; keep it whole in the relay's output.
        sender.begin_atomic(MAIN_WINDOW)?;
        let points = arc(frame, rank, scene.senders, scene.points);
        if let Some(&(x, y)) = points.first() {
            sender.move_to(MAIN_WINDOW, x, y).await?;
        }
        for &(x, y) in points.iter().skip(1) {
            sender.line_to(MAIN_WINDOW, x, y).await?;
        }
        sender.end_atomic(MAIN_WINDOW).await?;
        sender.circle(MAIN_WINDOW, 0.0, 0.0, RADIUS * 0.1).await?;

        if scene.caption && sender.is_host() {
            sender
                .text(CAPTION_WINDOW, -RADIUS, -RADIUS, 8.0, format!("frame {frame}"))
                .await?;
        }

        let feedback = sender.end_frame(MAIN_WINDOW).await?;
        if feedback.is_quit() {
            break;
        }
    }

    if scene.caption {
        sender.close_window(CAPTION_WINDOW).await?;
    }
    sender.close_window(MAIN_WINDOW).await?;
    sender.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arcs_meet_between_ranks() {
        let a = arc(3, 0, 4, 16);
        let b = arc(3, 1, 4, 16);
        let (ax, ay) = *a.last().unwrap();
        let (bx, by) = b[0];
        assert!((ax - bx).abs() < 1e-9 && (ay - by).abs() < 1e-9);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn arc_stays_inside_radius() {
        for (x, y) in arc(10, 2, 3, 50) {
            assert!(x.hypot(y) <= RADIUS + 1e-9);
        }
    }
}
