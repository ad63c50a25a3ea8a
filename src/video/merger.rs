use std::collections::VecDeque;
use std::iter::Fuse;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};
use crate::video::ffmpeg::{FfmpegReader, FfmpegWriter};
use crate::video::frame_io::{FrameSink, FrameSource};
use crate::video::types::{Clip, EncodedVideo, Frame, VideoParams};

/// Result of a merge
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// The merged video was written
    Merged(EncodedVideo),
    /// There was nothing to merge and no file was written
    NoClips,
}

/// Where the crossfade cursor is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    /// Passing frames of the current clip straight through
    DrainingSingle,
    /// Mixing the tail of the current clip with the head of the next one
    Blending { into_window: usize, window: usize },
    /// Every clip has been consumed
    Exhausted,
}

/// One clip being read, with a bounded lookahead so the tail is known
/// without trusting container frame counts.
struct ClipCursor<S> {
    source: S,
    lookahead: VecDeque<Frame>,
    eof: bool,
}

impl<S: FrameSource> ClipCursor<S> {
    fn new(source: S) -> Self {
        Self {
            source,
            lookahead: VecDeque::new(),
            eof: false,
        }
    }

    fn fill(&mut self, target: usize) -> Result<()> {
        while !self.eof && self.lookahead.len() < target {
            match self.source.next_frame()? {
                Some(frame) => self.lookahead.push_back(frame),
                None => self.eof = true,
            }
        }
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.lookahead.pop_front() {
            return Ok(Some(frame));
        }
        if self.eof {
            return Ok(None);
        }
        let frame = self.source.next_frame()?;
        self.eof = frame.is_none();
        Ok(frame)
    }
}

/// Crossfading reader over an ordered list of clips.
///
/// At most two clips are open at a time: the one being drained and its
/// successor once the drain reaches the transition window. Each clip frame is
/// read exactly once; incoming frames used by a blend are not emitted again.
pub struct CrossfadeCursor<S, I>
where
    I: Iterator<Item = Result<S>>,
{
    pending: Fuse<I>,
    current: Option<ClipCursor<S>>,
    next: Option<ClipCursor<S>>,
    window: usize,
    size: Option<(u32, u32)>,
    state: MergeState,
    emitted: usize,
}

impl<S, I> CrossfadeCursor<S, I>
where
    S: FrameSource,
    I: Iterator<Item = Result<S>>,
{
    /// `window` is the number of frames blended at each boundary
    pub fn new<T>(sources: T, window: usize) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            pending: sources.into_iter().fuse(),
            current: None,
            next: None,
            window,
            size: None,
            state: MergeState::DrainingSingle,
            emitted: 0,
        }
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    /// Frame size shared by every clip seen so far
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.size
    }

    pub fn frames_emitted(&self) -> usize {
        self.emitted
    }

    fn admit(&mut self, source: S) -> Result<ClipCursor<S>> {
        let dims = source.dimensions();
        match self.size {
            None => self.size = Some(dims),
            Some(expected) if expected != dims => {
                return Err(ConfigError::ResolutionMismatch {
                    clip: source.name(),
                    expected_width: expected.0,
                    expected_height: expected.1,
                    found_width: dims.0,
                    found_height: dims.1,
                }.into());
            }
            Some(_) => {}
        }
        debug!("Merging in {}", source.name());
        Ok(ClipCursor::new(source))
    }

    fn open_pending(&mut self) -> Result<Option<ClipCursor<S>>> {
        match self.pending.next() {
            Some(source) => Ok(Some(self.admit(source?)?)),
            None => Ok(None),
        }
    }

    fn load_next(&mut self) -> Result<()> {
        if self.next.is_none() {
            self.next = self.open_pending()?;
        }
        Ok(())
    }

    /// Move on to the successor, or finish
    fn advance(&mut self) -> Result<()> {
        self.current = match self.next.take() {
            Some(next) => Some(next),
            None => self.open_pending()?,
        };
        self.state = if self.current.is_some() {
            MergeState::DrainingSingle
        } else {
            MergeState::Exhausted
        };
        Ok(())
    }

    fn emit(&mut self, frame: Frame) -> Option<Frame> {
        self.emitted += 1;
        Some(frame)
    }

    /// Next output frame, or `None` when every clip has been consumed
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                MergeState::Exhausted => return Ok(None),

                MergeState::DrainingSingle => {
                    let window = self.window;
                    let at_tail = match self.current.as_mut() {
                        None => {
                            self.advance()?;
                            continue;
                        }
                        Some(current) => {
                            current.fill(window + 1)?;
                            current.eof && current.lookahead.len() <= window
                        }
                    };

                    if at_tail {
                        self.load_next()?;
                        if self.next.is_some() {
                            let tail = self.current.as_ref().map_or(0, |c| c.lookahead.len());
                            self.state = MergeState::Blending { into_window: 0, window: tail };
                            continue;
                        }
                    }

                    let pulled = match self.current.as_mut() {
                        Some(current) => current.pull()?,
                        None => None,
                    };
                    match pulled {
                        Some(frame) => return Ok(self.emit(frame)),
                        None => self.advance()?,
                    }
                }

                MergeState::Blending { into_window, window } => {
                    let outgoing = self.current.as_mut().and_then(|c| c.lookahead.pop_front());
                    let Some(outgoing) = outgoing else {
                        self.advance()?;
                        continue;
                    };

                    let incoming = match self.next.as_mut() {
                        Some(next) => next.pull()?,
                        None => None,
                    };

                    // a successor shorter than the window runs dry: finish unblended
                    let frame = match incoming {
                        Some(incoming) => {
                            let alpha = into_window as f32 / window as f32;
                            outgoing.blend(&incoming, alpha)?
                        }
                        None => outgoing,
                    };

                    self.state = MergeState::Blending { into_window: into_window + 1, window };
                    return Ok(self.emit(frame));
                }
            }
        }
    }
}

/// Run the crossfade over `sources` into `sink`, returning frames written
pub fn crossfade<S, T, K>(sources: T, window: usize, sink: &mut K) -> Result<usize>
where
    S: FrameSource,
    T: IntoIterator<Item = Result<S>>,
    K: FrameSink,
{
    let mut cursor = CrossfadeCursor::new(sources, window);
    while let Some(frame) = cursor.next_frame()? {
        sink.write_frame(&frame)?;
    }
    Ok(cursor.frames_emitted())
}

/// Every clip must share one resolution; returns it
pub fn check_resolutions(clips: &[Clip]) -> Result<(u32, u32)> {
    let Some(first) = clips.first() else {
        return Ok((0, 0));
    };
    let expected = first.resolution();

    for clip in &clips[1..] {
        if clip.resolution() != expected {
            return Err(ConfigError::ResolutionMismatch {
                clip: clip.name(),
                expected_width: expected.0,
                expected_height: expected.1,
                found_width: clip.width,
                found_height: clip.height,
            }.into());
        }
    }
    Ok(expected)
}

/// Concatenates clips into one video with a crossfade at every boundary
#[derive(Debug, Clone)]
pub struct TransitionMerger {
    params: VideoParams,
    transition_duration: f64,
}

impl TransitionMerger {
    /// A `transition_duration` of zero gives plain hard-cut concatenation
    pub fn new(params: VideoParams, transition_duration: f64) -> Self {
        Self {
            params,
            transition_duration: transition_duration.max(0.0),
        }
    }

    /// Frames blended at each boundary
    pub fn window_frames(&self) -> usize {
        (self.params.fps as f64 * self.transition_duration).round() as usize
    }

    pub fn merge<P: AsRef<Path>>(&self, clips: &[Clip], output_path: P) -> Result<MergeOutcome> {
        let output_path = output_path.as_ref();

        if clips.is_empty() {
            warn!("No clips to merge; {:?} was not written", output_path);
            return Ok(MergeOutcome::NoClips);
        }

        let size = check_resolutions(clips)?;
        let window = self.window_frames();

        info!(
            "Merging {} clips into {:?} ({} frame crossfades)",
            clips.len(), output_path, window
        );

        let readers = clips.iter().map(FfmpegReader::open);
        let video = self.merge_sources(readers, size, output_path)?;
        info!(
            "Merged video saved to {:?}: {} frames, {:.2}s, {:.1} MB",
            video.path, video.frame_count, video.duration,
            video.file_size as f64 / 1024.0 / 1024.0
        );

        Ok(MergeOutcome::Merged(video))
    }

    /// Crossfade `sources` of frame size `size` into a file at `output_path`.
    ///
    /// If any source fails to decode, the error is returned and nothing is
    /// left at `output_path`.
    pub fn merge_sources<S, T>(&self, sources: T, size: (u32, u32), output_path: &Path) -> Result<EncodedVideo>
    where
        S: FrameSource,
        T: IntoIterator<Item = Result<S>>,
    {
        let mut writer = FfmpegWriter::spawn(output_path, size, &self.params)?;
        let written = crossfade(sources, self.window_frames(), &mut writer)?;
        writer.finish()?;

        EncodedVideo::from_output(output_path, size, written, self.params.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VideoError;
    use crate::video::ffmpeg::check_ffmpeg_available;
    use crate::video::frame_io::MemoryClip;
    use crate::video::types::merged_frame_count;
    use crate::SlideshowError;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const SIZE: (u32, u32) = (4, 2);

    fn solid(name: &str, value: u8, count: usize) -> Result<MemoryClip> {
        Ok(MemoryClip::solid(name, SIZE, [value, value, value], count))
    }

    /// Clip whose frames carry their own index in the red channel
    fn numbered(name: &str, base: u8, count: usize) -> Result<MemoryClip> {
        let frames = (0..count)
            .map(|i| Frame::new_filled(SIZE.0, SIZE.1, [base + i as u8, 0, 0]))
            .collect();
        MemoryClip::new(name, frames)
    }

    fn run(sources: Vec<Result<MemoryClip>>, window: usize) -> Result<Vec<Frame>> {
        let mut out: Vec<Frame> = Vec::new();
        crossfade(sources, window, &mut out)?;
        Ok(out)
    }

    fn reds(frames: &[Frame]) -> Vec<u8> {
        frames.iter().map(|f| f.get_pixel(0, 0)[0]).collect()
    }

    #[test]
    fn test_two_clips_lose_one_window() {
        let out = run(vec![solid("a", 0, 30), solid("b", 200, 45)], 15).unwrap();
        assert_eq!(out.len(), 30 + 45 - 15);
        assert_eq!(out.len(), merged_frame_count(&[30, 45], 15));
    }

    #[test]
    fn test_blend_window_ramps_alpha() {
        let out = run(vec![solid("a", 0, 8), solid("b", 200, 8)], 4).unwrap();

        assert_eq!(reds(&out), vec![0, 0, 0, 0, 0, 50, 100, 150, 200, 200, 200, 200]);
        // midpoint of the window is the mean of both clips
        assert_eq!(out[6].get_pixel(3, 1), [100, 100, 100]);
    }

    #[test]
    fn test_successor_frames_are_consumed_once() {
        let out = run(vec![numbered("a", 0, 5), numbered("b", 100, 5)], 2).unwrap();

        // a0 a1 a2 | blend(a3,b0) blend(a4,b1) | b2 b3 b4
        assert_eq!(out.len(), 8);
        assert_eq!(reds(&out)[..3], [0, 1, 2]);
        assert_eq!(out[3].get_pixel(0, 0)[0], 3);
        assert_eq!(out[4].get_pixel(0, 0)[0], ((4.0f32 * 0.5) + (101.0 * 0.5)).round() as u8);
        assert_eq!(reds(&out)[5..], [102, 103, 104]);
    }

    #[test]
    fn test_last_clip_tail_is_unblended() {
        let out = run(vec![solid("a", 0, 6), solid("b", 100, 6), solid("c", 200, 6)], 3).unwrap();
        assert_eq!(out.len(), 18 - 6);
        assert_eq!(reds(&out)[9..], [200, 200, 200]);
    }

    #[test]
    fn test_window_clamped_to_short_clip() {
        // outgoing clip shorter than the window blends all of its frames
        let out = run(vec![solid("a", 0, 2), solid("b", 100, 10)], 5).unwrap();
        assert_eq!(reds(&out), vec![0, 50, 100, 100, 100, 100, 100, 100, 100, 100]);
    }

    #[test]
    fn test_short_successor_never_read_past_end() {
        let out = run(vec![solid("a", 0, 10), solid("b", 100, 3), solid("c", 200, 10)], 5).unwrap();

        assert_eq!(out.len(), merged_frame_count(&[10, 3, 10], 5));
        // b runs dry after three blended frames; a finishes on its own
        assert_eq!(reds(&out)[5..10], [0, 20, 40, 0, 0]);
        assert_eq!(reds(&out)[10..], [200; 10]);
    }

    #[test]
    fn test_zero_window_is_plain_concatenation() {
        let out = run(vec![numbered("a", 0, 3), numbered("b", 10, 2)], 0).unwrap();
        assert_eq!(reds(&out), vec![0, 1, 2, 10, 11]);
    }

    #[test]
    fn test_single_clip_passes_through() {
        let out = run(vec![numbered("a", 0, 4)], 15).unwrap();
        assert_eq!(reds(&out), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_clips_are_skipped() {
        let out = run(vec![solid("a", 0, 3), solid("empty", 50, 0), solid("c", 200, 3)], 0).unwrap();
        assert_eq!(reds(&out), vec![0, 0, 0, 200, 200, 200]);

        let out = run(Vec::new(), 15).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_states_walk_through_machine() {
        let sources = vec![solid("a", 0, 3), solid("b", 100, 3)];
        let mut cursor = CrossfadeCursor::new(sources, 1);
        let mut states = Vec::new();

        while cursor.next_frame().unwrap().is_some() {
            states.push(cursor.state());
        }
        states.push(cursor.state());

        assert_eq!(states[0], MergeState::DrainingSingle);
        assert!(states.contains(&MergeState::Blending { into_window: 1, window: 1 }));
        assert_eq!(*states.last().unwrap(), MergeState::Exhausted);
        assert_eq!(cursor.frames_emitted(), 5);
        assert_eq!(cursor.frame_size(), Some(SIZE));
    }

    #[test]
    fn test_resolution_mismatch_is_fatal() {
        let big = Ok(MemoryClip::solid("big", (8, 8), [0, 0, 0], 3));
        let result = run(vec![solid("a", 0, 3), big], 1);

        assert!(matches!(
            result,
            Err(SlideshowError::Config(ConfigError::ResolutionMismatch { .. }))
        ));
    }

    #[test]
    fn test_check_resolutions_on_clip_metadata() {
        let clip = |name: &str, width, height| Clip {
            path: PathBuf::from(name),
            width,
            height,
            fps: 30.0,
            frame_count: 10,
            direction: None,
        };

        let same = [clip("a.mp4", 1620, 2880), clip("b.mp4", 1620, 2880)];
        assert_eq!(check_resolutions(&same).unwrap(), (1620, 2880));

        let mixed = [clip("a.mp4", 1620, 2880), clip("b.mp4", 1080, 1920)];
        let err = check_resolutions(&mixed).unwrap_err();
        assert!(err.to_string().contains("b.mp4"));
    }

    #[test]
    fn test_merge_nothing_writes_nothing() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("final.mp4");
        let merger = TransitionMerger::new(VideoParams::default(), 0.5);

        let outcome = merger.merge(&[], &output).unwrap();
        assert!(matches!(outcome, MergeOutcome::NoClips));
        assert!(!output.exists());
    }

    /// Yields `good` frames, then fails like a truncated clip
    struct BrokenClip {
        inner: MemoryClip,
        good: usize,
    }

    impl FrameSource for BrokenClip {
        fn dimensions(&self) -> (u32, u32) {
            self.inner.dimensions()
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.good == 0 {
                return Err(VideoError::DecodingFailed {
                    reason: "truncated frame".to_string(),
                }.into());
            }
            self.good -= 1;
            self.inner.next_frame()
        }
    }

    #[test]
    fn test_decode_failure_leaves_no_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("final.mp4");
        let merger = TransitionMerger::new(VideoParams::default(), 0.1);
        let size = (32, 16);
        let sources = vec![
            Ok(BrokenClip { inner: MemoryClip::solid("a", size, [0, 0, 0], 10), good: 10 }),
            Ok(BrokenClip { inner: MemoryClip::solid("b", size, [200, 200, 200], 10), good: 4 }),
        ];

        let result = merger.merge_sources(sources, size, &output);

        if check_ffmpeg_available() {
            assert!(matches!(
                result,
                Err(SlideshowError::Video(VideoError::DecodingFailed { .. }))
            ));
        } else {
            assert!(result.is_err());
        }
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_window_frames_from_duration() {
        assert_eq!(TransitionMerger::new(VideoParams::default(), 0.5).window_frames(), 15);
        assert_eq!(TransitionMerger::new(VideoParams::default(), 0.25).window_frames(), 8);
        assert_eq!(TransitionMerger::new(VideoParams::default(), 0.0).window_frames(), 0);
    }
}
