//! Render bridge: mailbox frame → texture → quad → drawable.

use crate::bridge::TextureBridge;
use crate::error::FrameError;
use crate::geometry::QuadOrientation;
use crate::mailbox::{MailboxReceiver, MailboxStats};
use crate::output::RenderTarget;
use crate::shader::{GpuContext, QuadPipeline, ShaderLibrary};
use crate::utils::RateCounter;
use tracing::debug;

/// Result of one render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// A camera frame of this size was drawn and presented
    Frame { width: u32, height: u32 },
    /// The untextured quad was drawn (nothing captured yet)
    Placeholder,
    /// The last camera frame was drawn again after the target was invalidated
    Repainted,
    /// Nothing new to draw; the previous image stays on screen
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoNewFrame,
    NotRunning,
}

/// Draw counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames_drawn: u64,
    pub placeholders_drawn: u64,
    pub repaints: u64,
    pub failed: u64,
}

/// Owns everything on the render side of the mailbox.
pub struct RenderBridge {
    quad: QuadPipeline,
    textures: TextureBridge,
    mailbox: MailboxReceiver,
    clear: wgpu::Color,
    /// Draw again even though nothing new arrived
    needs_repaint: bool,
    stats: RenderStats,
    draw_rate: RateCounter,
}

impl RenderBridge {
    pub fn new(
        gpu: &GpuContext,
        library: &ShaderLibrary,
        target_format: wgpu::TextureFormat,
        orientation: QuadOrientation,
        mailbox: MailboxReceiver,
    ) -> Self {
        Self {
            quad: QuadPipeline::new(gpu, library, target_format, orientation),
            textures: TextureBridge::new(),
            mailbox,
            clear: wgpu::Color::BLACK,
            needs_repaint: true,
            stats: RenderStats::default(),
            draw_rate: RateCounter::default(),
        }
    }

    pub fn set_orientation(&mut self, gpu: &GpuContext, orientation: QuadOrientation) {
        self.quad.set_orientation(gpu, orientation);
    }

    /// Marks the target contents as lost (e.g. after a resize).
    pub fn invalidate(&mut self) {
        self.needs_repaint = true;
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn mailbox_stats(&self) -> MailboxStats {
        self.mailbox.stats()
    }

    /// Draws the pending frame (or the placeholder before the first frame)
    /// into a drawable from `target` and presents it.
    ///
    /// Errors only cost this frame; the previous image stays on screen.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        target: &mut dyn RenderTarget,
    ) -> Result<DrawOutcome, FrameError> {
        let result = self.render_inner(gpu, target);
        match result {
            Ok(DrawOutcome::Frame { .. }) => self.stats.frames_drawn += 1,
            Ok(DrawOutcome::Placeholder) => self.stats.placeholders_drawn += 1,
            Ok(DrawOutcome::Repainted) => self.stats.repaints += 1,
            Ok(DrawOutcome::Skipped(_)) => {}
            Err(_) => self.stats.failed += 1,
        }
        if !matches!(result, Ok(DrawOutcome::Skipped(_))) {
            if let Some(rate) = self.draw_rate.tick() {
                let mailbox = self.mailbox.stats();
                debug!(
                    "[Perf] Drawing at {:.2} FPS (captured {}, dropped {}, replaced {})",
                    rate, mailbox.offered, mailbox.dropped, mailbox.replaced
                );
            }
        }
        result
    }

    fn render_inner(
        &mut self,
        gpu: &GpuContext,
        target: &mut dyn RenderTarget,
    ) -> Result<DrawOutcome, FrameError> {
        let Some(lease) = self.mailbox.take() else {
            if !self.needs_repaint {
                return Ok(DrawOutcome::Skipped(SkipReason::NoNewFrame));
            }
            // The cache still holds the last frame; without one, the placeholder
            let last = self.textures.last_wrapped();
            let drawable = target.acquire(gpu)?;
            self.quad.draw(gpu, drawable.view(), last.as_ref(), self.clear);
            drawable.present();
            let outcome = match last {
                Some(_) => DrawOutcome::Repainted,
                None => DrawOutcome::Placeholder,
            };
            self.needs_repaint = false;
            return Ok(outcome);
        };

        // Textures for an earlier camera resolution are never needed again
        let layout = TextureBridge::validate(gpu, &lease)?;
        self.textures.retain_only(&layout);

        let texture = self.textures.wrap(gpu, &lease)?;
        let drawable = target.acquire(gpu)?;
        self.quad.draw(gpu, drawable.view(), Some(&texture), self.clear);
        drawable.present();
        self.needs_repaint = false;

        // `texture` is dropped before `lease`, which then frees the mailbox slot
        Ok(DrawOutcome::Frame {
            width: texture.width(),
            height: texture.height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, PixelFormat};
    use crate::mailbox::{frame_mailbox, Backpressure, MailboxSender, Offer};
    use crate::output::OffscreenOutput;
    use crate::shader::test_context;

    const RED: [u8; 4] = [0, 0, 255, 255];
    const BLUE: [u8; 4] = [255, 0, 0, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    fn setup(gpu: &GpuContext) -> (RenderBridge, MailboxSender, OffscreenOutput) {
        let (tx, rx) = frame_mailbox(Backpressure::DropIncoming, None);
        let target = OffscreenOutput::new(gpu, 64, 64).unwrap();
        let library = ShaderLibrary::builtin().unwrap();
        let bridge = RenderBridge::new(gpu, &library, target.format(), QuadOrientation::UPRIGHT, rx);
        (bridge, tx, target)
    }

    fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
    }

    #[test]
    fn test_placeholder_before_first_frame() {
        let Some(gpu) = test_context() else { return };
        let (mut bridge, _tx, mut target) = setup(&gpu);

        assert_eq!(bridge.render(&gpu, &mut target), Ok(DrawOutcome::Placeholder));
        assert_eq!(
            bridge.render(&gpu, &mut target),
            Ok(DrawOutcome::Skipped(SkipReason::NoNewFrame))
        );
        let pixels = target.read_pixels(&gpu).unwrap();
        assert_eq!(pixel(&pixels, 64, 32, 32), BLACK);

        bridge.invalidate();
        assert_eq!(bridge.render(&gpu, &mut target), Ok(DrawOutcome::Placeholder));
        assert_eq!(bridge.stats().placeholders_drawn, 2);
    }

    #[test]
    fn test_frame_covers_whole_viewport() {
        let Some(gpu) = test_context() else { return };
        let (mut bridge, tx, mut target) = setup(&gpu);

        // A wide frame is stretched, not letterboxed
        tx.offer(Frame::solid_bgra(16, 2, RED));
        assert_eq!(
            bridge.render(&gpu, &mut target),
            Ok(DrawOutcome::Frame { width: 16, height: 2 })
        );

        let pixels = target.read_pixels(&gpu).unwrap();
        for px in pixels.chunks_exact(4) {
            assert_eq!(px, RED);
        }
    }

    #[test]
    fn test_slot_freed_after_draw() {
        let Some(gpu) = test_context() else { return };
        let (mut bridge, tx, mut target) = setup(&gpu);

        assert_eq!(tx.offer(Frame::solid_bgra(4, 4, RED)), Offer::Accepted);
        assert_eq!(tx.offer(Frame::solid_bgra(4, 4, BLUE)), Offer::Dropped);
        bridge.render(&gpu, &mut target).unwrap();
        assert_eq!(tx.offer(Frame::solid_bgra(4, 4, BLUE)), Offer::Accepted);

        let stats = bridge.mailbox_stats();
        assert_eq!(stats.released, 1);
        assert!(stats.released <= stats.accepted);
    }

    #[test]
    fn test_bad_frame_keeps_previous_image() {
        let Some(gpu) = test_context() else { return };
        let (mut bridge, tx, mut target) = setup(&gpu);

        tx.offer(Frame::solid_bgra(4, 4, BLUE));
        bridge.render(&gpu, &mut target).unwrap();

        tx.offer(Frame::from_data(4, 4, PixelFormat::Yuyv, vec![0; 32]));
        assert_eq!(
            bridge.render(&gpu, &mut target),
            Err(FrameError::UnsupportedFormat(PixelFormat::Yuyv))
        );
        assert_eq!(bridge.stats().failed, 1);

        let pixels = target.read_pixels(&gpu).unwrap();
        assert_eq!(pixel(&pixels, 64, 10, 10), BLUE);
        // The failed frame still released its slot
        assert_eq!(tx.offer(Frame::solid_bgra(4, 4, RED)), Offer::Accepted);
    }

    #[test]
    fn test_orientation_mirrors_image() {
        let Some(gpu) = test_context() else { return };
        let (mut bridge, tx, mut target) = setup(&gpu);
        let split = || {
            let mut data = RED.to_vec();
            data.extend_from_slice(&BLUE);
            Frame::from_data(2, 1, PixelFormat::Bgra, data)
        };

        tx.offer(split());
        bridge.render(&gpu, &mut target).unwrap();
        let pixels = target.read_pixels(&gpu).unwrap();
        assert_eq!(pixel(&pixels, 64, 0, 32), RED);
        assert_eq!(pixel(&pixels, 64, 63, 32), BLUE);

        bridge.set_orientation(&gpu, QuadOrientation { mirror: true, ..QuadOrientation::UPRIGHT });
        tx.offer(split());
        bridge.render(&gpu, &mut target).unwrap();
        let pixels = target.read_pixels(&gpu).unwrap();
        assert_eq!(pixel(&pixels, 64, 0, 32), BLUE);
        assert_eq!(pixel(&pixels, 64, 63, 32), RED);
    }

    #[test]
    fn test_invalidate_repaints_last_frame() {
        let Some(gpu) = test_context() else { return };
        let (mut bridge, tx, mut target) = setup(&gpu);

        tx.offer(Frame::solid_bgra(4, 4, RED));
        bridge.render(&gpu, &mut target).unwrap();
        assert_eq!(
            bridge.render(&gpu, &mut target),
            Ok(DrawOutcome::Skipped(SkipReason::NoNewFrame))
        );

        // A resize throws the old contents away; no new frame is coming
        target.resize(&gpu, 32, 16);
        bridge.invalidate();
        assert_eq!(bridge.render(&gpu, &mut target), Ok(DrawOutcome::Repainted));
        assert_eq!(
            bridge.render(&gpu, &mut target),
            Ok(DrawOutcome::Skipped(SkipReason::NoNewFrame))
        );

        let pixels = target.read_pixels(&gpu).unwrap();
        assert_eq!(pixels.len(), 32 * 16 * 4);
        for px in pixels.chunks_exact(4) {
            assert_eq!(px, RED);
        }
        assert_eq!(bridge.stats().repaints, 1);
        assert_eq!(bridge.stats().placeholders_drawn, 0);
    }

    #[test]
    fn test_orientation_change_shows_without_new_frame() {
        let Some(gpu) = test_context() else { return };
        let (mut bridge, tx, mut target) = setup(&gpu);
        let mut data = RED.to_vec();
        data.extend_from_slice(&BLUE);
        tx.offer(Frame::from_data(2, 1, PixelFormat::Bgra, data));
        bridge.render(&gpu, &mut target).unwrap();

        bridge.set_orientation(&gpu, QuadOrientation { mirror: true, ..QuadOrientation::UPRIGHT });
        bridge.invalidate();
        assert_eq!(bridge.render(&gpu, &mut target), Ok(DrawOutcome::Repainted));

        let pixels = target.read_pixels(&gpu).unwrap();
        assert_eq!(pixel(&pixels, 64, 0, 32), BLUE);
        assert_eq!(pixel(&pixels, 64, 63, 32), RED);
    }

    #[test]
    fn test_oversized_frame_is_skipped() {
        let Some(gpu) = test_context() else { return };
        let (mut bridge, tx, mut target) = setup(&gpu);

        tx.offer(Frame::solid_bgra(4, 4, BLUE));
        bridge.render(&gpu, &mut target).unwrap();

        let max = gpu.max_texture_dimension();
        tx.offer(Frame::solid_bgra(max + 1, 1, RED));
        assert!(matches!(
            bridge.render(&gpu, &mut target),
            Err(FrameError::InvalidFrame(_))
        ));
        assert_eq!(bridge.stats().failed, 1);

        // The rejected frame did not evict the one on screen
        bridge.invalidate();
        assert_eq!(bridge.render(&gpu, &mut target), Ok(DrawOutcome::Repainted));
        let pixels = target.read_pixels(&gpu).unwrap();
        assert_eq!(pixel(&pixels, 64, 32, 32), BLUE);
    }
}
