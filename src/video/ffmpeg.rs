//! Thin wrappers around the system `ffmpeg` and `ffprobe` binaries.
//!
//! Frames travel as packed `rgb24` over the child's stdin (encoding) or
//! stdout (decoding), so no image files are staged on disk per frame.

use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, VideoError};
use crate::video::frame_io::{FrameSink, FrameSource};
use crate::video::types::{Clip, Frame, VideoParams};

pub fn check_ffmpeg_available() -> bool {
    tool_runs("ffmpeg")
}

pub fn check_ffprobe_available() -> bool {
    tool_runs("ffprobe")
}

fn tool_runs(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn spawn_stderr_drain(child: &mut Child) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    let mut stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok(bytes)
    }))
}

fn collect_stderr(drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> String {
    drain
        .and_then(|handle| handle.join().ok())
        .and_then(|result| result.ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default()
}

/// Hidden sibling that ffmpeg writes into until the file is complete,
/// e.g. `out/final.mp4` -> `out/.final.partial.mp4`
fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!(".{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!(".{}.partial", stem),
    };
    path.with_file_name(name)
}

/// Streams frames into an `ffmpeg` child that writes one MP4 file.
///
/// The file only appears at its final path once [`finish`](Self::finish)
/// succeeds; an encode that fails or is dropped leaves nothing behind.
pub struct FfmpegWriter {
    path: PathBuf,
    partial: PathBuf,
    size: (u32, u32),
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    frames_written: usize,
}

impl FfmpegWriter {
    pub fn spawn<P: AsRef<Path>>(path: P, (width, height): (u32, u32), params: &VideoParams) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(VideoError::EncodingFailed {
                reason: format!("{}x{} is not encodable as yuv420p (dimensions must be even and non-zero)", width, height),
            }.into());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let partial = partial_path(&path);

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel", "error",
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "-s", &format!("{}x{}", width, height),
            "-r", &params.fps.to_string(),
            "-i", "pipe:0",
            "-an",
            "-c:v", &params.codec,
            "-tag:v", &params.fourcc,
            "-q:v", &params.quality.to_string(),
            "-pix_fmt", "yuv420p",
        ]);
        cmd.arg(&partial);

        debug!("Spawning ffmpeg encoder for {:?} ({}x{} @ {} fps)", path, width, height, params.fps);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                VideoError::FfmpegNotFound
            } else {
                VideoError::EncodingFailed {
                    reason: format!("Failed to spawn FFmpeg process: {}", e),
                }
            }
        })?;

        let stdin = child.stdin.take().ok_or_else(|| VideoError::EncodingFailed {
            reason: "failed to open ffmpeg stdin".to_string(),
        })?;
        let stderr_drain = spawn_stderr_drain(&mut child);

        Ok(Self {
            path,
            partial,
            size: (width, height),
            child: Some(child),
            stdin: Some(stdin),
            stderr_drain,
            frames_written: 0,
        })
    }

    /// Close the pipe and wait for ffmpeg to finalize the file
    pub fn finish(mut self) -> Result<usize> {
        drop(self.stdin.take());

        let status = match self.child.take() {
            Some(mut child) => child.wait()?,
            None => return Ok(self.frames_written),
        };
        let stderr = collect_stderr(self.stderr_drain.take());

        if !status.success() {
            return Err(VideoError::EncodingFailed {
                reason: format!("FFmpeg failed writing {}: {}", self.path.display(), stderr),
            }.into());
        }

        std::fs::rename(&self.partial, &self.path)?;
        Ok(self.frames_written)
    }

    fn fail_with_stderr(&mut self, cause: std::io::Error) -> VideoError {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        let stderr = collect_stderr(self.stderr_drain.take());
        VideoError::EncodingFailed {
            reason: format!("writing frame {} to ffmpeg failed: {} {}", self.frames_written, cause, stderr),
        }
    }
}

impl FrameSink for FfmpegWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != self.size {
            return Err(VideoError::InvalidFrame {
                reason: format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    frame.width(), frame.height(), self.size.0, self.size.1
                ),
            }.into());
        }

        let stdin = self.stdin.as_mut().ok_or_else(|| VideoError::EncodingFailed {
            reason: "ffmpeg encoder already closed".to_string(),
        })?;

        if let Err(e) = stdin.write_all(frame.as_bytes()) {
            return Err(self.fail_with_stderr(e).into());
        }

        self.frames_written += 1;
        Ok(())
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("Discarding unfinished encode of {:?}", self.path);
            let _ = child.kill();
            let _ = child.wait();
        }
        if self.partial.exists() {
            if let Err(e) = std::fs::remove_file(&self.partial) {
                warn!("Failed to remove {:?}: {}", self.partial, e);
            }
        }
    }
}

/// Decodes one clip through an `ffmpeg` child, frame by frame
pub struct FfmpegReader {
    path: PathBuf,
    size: (u32, u32),
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    frames_read: usize,
}

impl FfmpegReader {
    pub fn open(clip: &Clip) -> Result<Self> {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args(["-loglevel", "error", "-i"]);
        cmd.arg(&clip.path);
        cmd.args([
            "-an",
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "pipe:1",
        ]);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                VideoError::FfmpegNotFound
            } else {
                VideoError::DecodingFailed {
                    reason: format!("Failed to spawn FFmpeg for {}: {}", clip.path.display(), e),
                }
            }
        })?;

        let stdout = child.stdout.take().map(BufReader::new).ok_or_else(|| VideoError::DecodingFailed {
            reason: "failed to open ffmpeg stdout".to_string(),
        })?;
        let stderr_drain = spawn_stderr_drain(&mut child);

        debug!("Opened {} for decoding ({}x{})", clip.name(), clip.width, clip.height);

        Ok(Self {
            path: clip.path.clone(),
            size: clip.resolution(),
            child: Some(child),
            stdout: Some(stdout),
            stderr_drain,
            frames_read: 0,
        })
    }

    fn close(&mut self) -> Result<()> {
        drop(self.stdout.take());
        let status = match self.child.take() {
            Some(mut child) => child.wait()?,
            None => return Ok(()),
        };
        let stderr = collect_stderr(self.stderr_drain.take());

        if !status.success() {
            return Err(VideoError::DecodingFailed {
                reason: format!("FFmpeg failed reading {}: {}", self.path.display(), stderr),
            }.into());
        }
        Ok(())
    }
}

impl FrameSource for FfmpegReader {
    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let frame_len = self.size.0 as usize * self.size.1 as usize * 3;
        let mut buffer = vec![0u8; frame_len];
        let mut filled = 0;
        while filled < frame_len {
            match stdout.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            self.close()?;
            return Ok(None);
        }

        if filled < frame_len {
            return Err(VideoError::DecodingFailed {
                reason: format!(
                    "{}: truncated frame {} ({} of {} bytes)",
                    self.path.display(), self.frames_read, filled, frame_len
                ),
            }.into());
        }

        self.frames_read += 1;
        Frame::from_rgb_bytes(self.size.0, self.size.1, buffer)
            .map(Some)
            .ok_or_else(|| VideoError::DecodingFailed {
                reason: "decoded buffer does not match frame size".to_string(),
            }.into())
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_read_packets: Option<String>,
    nb_frames: Option<String>,
}

/// Parse an ffprobe rational such as `30/1` or `30000/1001`
fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.trim().parse().ok(),
    }
}

/// Read resolution, frame rate and frame count of an existing clip
pub fn probe_clip<P: AsRef<Path>>(path: P) -> Result<Clip> {
    let path = path.as_ref();
    let probe_failed = |reason: String| VideoError::ProbeFailed {
        path: path.display().to_string(),
        reason,
    };

    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-count_packets",
            "-show_entries", "stream=width,height,r_frame_rate,nb_frames,nb_read_packets",
            "-print_format", "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                VideoError::FfmpegNotFound
            } else {
                probe_failed(e.to_string())
            }
        })?;

    if !output.status.success() {
        return Err(probe_failed(String::from_utf8_lossy(&output.stderr).trim().to_string()).into());
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| probe_failed(format!("invalid ffprobe output: {}", e)))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| probe_failed("no video stream".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(probe_failed("missing frame size".to_string()).into()),
    };
    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);
    let frame_count = stream
        .nb_read_packets
        .or(stream.nb_frames)
        .and_then(|count| count.parse().ok())
        .unwrap_or(0);

    debug!("Probed {:?}: {}x{} @ {:.2} fps, {} frames", path, width, height, fps, frame_count);

    Ok(Clip {
        path: path.to_path_buf(),
        width,
        height,
        fps,
        frame_count,
        direction: None,
    })
}
