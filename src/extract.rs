use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::boundary::Boundary;
use crate::cancel::StopSignal;
use crate::config::StreamConfig;
use crate::locate::{self, JPEG_SOI};
use crate::{Result, StreamError};

/// Frame under assembly.
///
/// `frame` never holds more than `max_frame_size` bytes of frame data plus
/// a tail of `boundary.len() - 1` bytes that may still turn out to be the
/// beginning of a boundary split across reads.
struct Assembly {
    frame: Vec<u8>,
    seam: Vec<u8>,
    max_frame_size: usize,
}

impl Assembly {
    fn new(max_frame_size: usize) -> Self {
        Self {
            frame: Vec::new(),
            seam: Vec::new(),
            max_frame_size,
        }
    }

    fn reset(&mut self) {
        self.frame.clear();
    }

    /// Append `data` to the frame, stopping at the first boundary.
    ///
    /// Returns `true` once the boundary has been seen. The frame then holds
    /// exactly the frame bytes and `leftover` everything from the boundary
    /// onwards.
    fn push(
        &mut self,
        data: &[u8],
        boundary: &[u8],
        leftover: &mut Vec<u8>,
    ) -> Result<bool> {
        let overlap = boundary.len() - 1;
        let tail = self.frame.len().saturating_sub(overlap);

        // A boundary starting inside the frame tail is fully contained in
        // the tail plus `overlap` bytes of the new data.
        self.seam.clear();
        self.seam.extend_from_slice(&self.frame[tail..]);
        self.seam
            .extend_from_slice(&data[..data.len().min(overlap)]);

        if let Some(pos) = locate::find(&self.seam, boundary) {
            let end = tail + pos;
            self.check_fits(end)?;
            leftover.clear();
            leftover.extend_from_slice(&self.frame[end..]);
            leftover.extend_from_slice(data);
            self.frame.truncate(end);
            return Ok(true);
        }

        if let Some(pos) = locate::find(data, boundary) {
            self.check_fits(self.frame.len() + pos)?;
            self.frame.extend_from_slice(&data[..pos]);
            leftover.clear();
            leftover.extend_from_slice(&data[pos..]);
            return Ok(true);
        }

        // Only the last `overlap` bytes may still belong to a boundary.
        self.check_fits(
            (self.frame.len() + data.len()).saturating_sub(overlap),
        )?;
        self.frame.extend_from_slice(data);
        Ok(false)
    }

    fn check_fits(&self, frame_len: usize) -> Result<()> {
        if frame_len > self.max_frame_size {
            return Err(StreamError::Overflow {
                limit: self.max_frame_size,
            });
        }
        Ok(())
    }
}

/// Pulls JPEG frames out of a multipart body.
///
/// Frames are delimited by the JPEG start marker and the next occurrence of
/// the multipart boundary. Bytes after the boundary are kept for the next
/// frame. A single reader owns all buffers, nothing here is shared.
pub struct FrameExtractor<R> {
    reader: R,
    boundary: Boundary,
    stop: StopSignal,
    read_timeout: Duration,
    chunk: Vec<u8>,
    pending: Vec<u8>,
    assembly: Assembly,
    bytes_read: u64,
    frames: u64,
}

impl<R> FrameExtractor<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        reader: R,
        boundary: Boundary,
        config: &StreamConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            reader,
            boundary,
            stop,
            read_timeout: config.read_timeout(),
            chunk: vec![0; config.chunk_size.max(1)],
            pending: Vec::new(),
            assembly: Assembly::new(config.max_frame_size),
            bytes_read: 0,
            frames: 0,
        }
    }

    /// Read until the next complete frame.
    ///
    /// Returns `Ok(None)` once the stop signal is raised; a frame still being
    /// assembled at that point is dropped. Any error is final.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let Some(mut complete) = self.seek_start().await? else {
            return Ok(None);
        };

        while !complete {
            let Some(read) = self.read_chunk().await? else {
                trace!("extract: stopped with a partial frame, dropping it");
                return Ok(None);
            };
            complete = self.assembly.push(
                &self.chunk[..read],
                self.boundary.as_bytes(),
                &mut self.pending,
            )?;
        }

        self.frames += 1;
        let frame = Bytes::copy_from_slice(&self.assembly.frame);
        debug!(
            "extract: frame #{} complete, {} bytes",
            self.frames,
            frame.len()
        );
        Ok(Some(frame))
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Total number of body bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Number of frames extracted so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Skip multipart headers until the JPEG start marker, then hand the
    /// marker and everything after it to the frame assembly.
    ///
    /// Returns whether that already completed the frame, or `None` on stop.
    async fn seek_start(&mut self) -> Result<Option<bool>> {
        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }

            if let Some(start) = locate::find(&self.pending, &JPEG_SOI) {
                let pending = std::mem::take(&mut self.pending);
                self.assembly.reset();
                let complete = self.assembly.push(
                    &pending[start..],
                    self.boundary.as_bytes(),
                    &mut self.pending,
                )?;
                return Ok(Some(complete));
            }

            // Keep what could be the first half of a split marker.
            let keep = JPEG_SOI.len() - 1;
            if self.pending.len() > keep {
                self.pending.drain(..self.pending.len() - keep);
            }

            let Some(read) = self.read_chunk().await? else {
                return Ok(None);
            };
            self.pending
                .extend_from_slice(&self.chunk[..read]);
        }
    }

    /// One read of at most `chunk_size` bytes, abandoned on stop.
    async fn read_chunk(&mut self) -> Result<Option<usize>> {
        if self.stop.is_stopped() {
            return Ok(None);
        }

        let timeout = self.read_timeout;
        let read = tokio::select! {
            biased;
            _ = self.stop.stopped() => return Ok(None),
            read = tokio::time::timeout(
                timeout,
                self.reader.read(&mut self.chunk),
            ) => read,
        };

        let read = read.map_err(|_| StreamError::Timeout(timeout))??;
        if read == 0 {
            return Err(StreamError::Ended);
        }

        self.bytes_read += read as u64;
        trace!("extract: read {} bytes", read);
        Ok(Some(read))
    }
}
