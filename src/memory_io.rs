//! In-memory demuxer and muxer contexts.
//!
//! [`Demuxer`] wraps an FFmpeg input context that reads either from a file
//! path or from a shared byte blob through a custom `AVIOContext`.
//! [`MemoryOutput`] wraps an output context backed by FFmpeg's dynamic
//! buffer I/O (`avio_open_dyn_buf`), so muxed bytes never touch the
//! filesystem.
//!
//! Both types own raw FFmpeg allocations and release them in `Drop`, in
//! the order FFmpeg requires: the format context first, then the custom
//! I/O context and its buffer.

use std::{
    ffi::{CString, c_int, c_void},
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    path::Path,
    ptr,
    sync::Arc,
};

use ffmpeg_next::format::context::{Input, Output};
use ffmpeg_sys_next::{AVFormatContext, AVIOContext};

use crate::error::{ReelcutError, Stage};

const IO_BUFFER_SIZE: usize = 64 * 1024;

// libavformat/avio.h
const AVSEEK_SIZE: c_int = 0x10000;
const AVSEEK_FORCE: c_int = 0x20000;
const SEEK_SET: c_int = 0;
const SEEK_CUR: c_int = 1;
const SEEK_END: c_int = 2;
const EINVAL_ERROR: i64 = -22;

/// Read position over a shared blob, owned by the custom I/O context.
struct ReadCursor {
    data: Arc<[u8]>,
    position: usize,
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buffer: *mut u8, size: c_int) -> c_int {
    // SAFETY: `opaque` is the `ReadCursor` leaked in `Demuxer::from_bytes`
    // and stays alive until the demuxer is dropped.
    let cursor = unsafe { &mut *(opaque as *mut ReadCursor) };
    let remaining = cursor.data.len().saturating_sub(cursor.position);
    if remaining == 0 || size <= 0 {
        return ffmpeg_sys_next::AVERROR_EOF;
    }
    let count = remaining.min(size as usize);
    unsafe {
        ptr::copy_nonoverlapping(cursor.data.as_ptr().add(cursor.position), buffer, count);
    }
    cursor.position += count;
    count as c_int
}

unsafe extern "C" fn seek_packet(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let cursor = unsafe { &mut *(opaque as *mut ReadCursor) };
    let length = cursor.data.len() as i64;
    if whence & AVSEEK_SIZE != 0 {
        return length;
    }
    let base = match whence & !AVSEEK_FORCE {
        SEEK_SET => 0,
        SEEK_CUR => cursor.position as i64,
        SEEK_END => length,
        _ => return EINVAL_ERROR,
    };
    let target = base + offset;
    if target < 0 || target > length {
        return EINVAL_ERROR;
    }
    cursor.position = target as usize;
    target
}

/// Custom I/O allocations that outlive the format context using them.
struct CustomIo {
    avio: *mut AVIOContext,
    cursor: *mut ReadCursor,
}

impl CustomIo {
    /// Free the I/O context, its (possibly reallocated) buffer and the cursor.
    unsafe fn release(&mut self) {
        unsafe {
            if !self.avio.is_null() {
                ffmpeg_sys_next::av_freep(&mut (*self.avio).buffer as *mut *mut u8 as *mut c_void);
                ffmpeg_sys_next::avio_context_free(&mut self.avio);
            }
            if !self.cursor.is_null() {
                drop(Box::from_raw(self.cursor));
                self.cursor = ptr::null_mut();
            }
        }
    }
}

/// An opened FFmpeg input (demuxer) context.
///
/// Dereferences to [`ffmpeg_next::format::context::Input`].
pub(crate) struct Demuxer {
    input: ManuallyDrop<Input>,
    custom_io: Option<CustomIo>,
}

// SAFETY: the demuxer exclusively owns its format context and custom I/O
// allocations; nothing is shared with other threads.
unsafe impl Send for Demuxer {}

impl Demuxer {
    /// Open a demuxer over a file path.
    pub(crate) fn from_path(path: &Path) -> Result<Self, ReelcutError> {
        let input = ffmpeg_next::format::input(&path).map_err(|error| match error {
            ffmpeg_next::Error::InvalidData => ReelcutError::UnsupportedFormat(format!(
                "{}: no demuxer recognises this container",
                path.display()
            )),
            other => ReelcutError::Io(std::io::Error::other(format!(
                "{}: {other}",
                path.display()
            ))),
        })?;
        Ok(Self {
            input: ManuallyDrop::new(input),
            custom_io: None,
        })
    }

    /// Open a demuxer that reads from an in-memory blob.
    pub(crate) fn from_bytes(data: Arc<[u8]>) -> Result<Self, ReelcutError> {
        if data.is_empty() {
            return Err(ReelcutError::UnsupportedFormat(
                "empty input blob".to_string(),
            ));
        }

        // SAFETY: the sequence below follows FFmpeg's documented custom I/O
        // setup. Every early return releases what was allocated so far; on
        // success ownership moves into the returned `Demuxer`.
        unsafe {
            let buffer = ffmpeg_sys_next::av_malloc(IO_BUFFER_SIZE) as *mut u8;
            if buffer.is_null() {
                return Err(ReelcutError::Io(std::io::Error::other(
                    "failed to allocate demuxer I/O buffer",
                )));
            }

            let cursor = Box::into_raw(Box::new(ReadCursor { data, position: 0 }));
            let avio = ffmpeg_sys_next::avio_alloc_context(
                buffer,
                IO_BUFFER_SIZE as c_int,
                0,
                cursor as *mut c_void,
                Some(read_packet),
                None,
                Some(seek_packet),
            );
            let mut custom_io = CustomIo { avio, cursor };
            if avio.is_null() {
                ffmpeg_sys_next::av_free(buffer as *mut c_void);
                custom_io.release();
                return Err(ReelcutError::Io(std::io::Error::other(
                    "failed to allocate demuxer I/O context",
                )));
            }

            let mut context: *mut AVFormatContext = ffmpeg_sys_next::avformat_alloc_context();
            if context.is_null() {
                custom_io.release();
                return Err(ReelcutError::Io(std::io::Error::other(
                    "failed to allocate format context",
                )));
            }
            (*context).pb = avio;
            (*context).flags |= ffmpeg_sys_next::AVFMT_FLAG_CUSTOM_IO as c_int;

            // On failure FFmpeg frees `context` itself but leaves custom I/O alone.
            let open_result = ffmpeg_sys_next::avformat_open_input(
                &mut context,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            );
            if open_result < 0 {
                custom_io.release();
                return Err(ReelcutError::UnsupportedFormat(format!(
                    "no demuxer recognises this container ({})",
                    ffmpeg_next::Error::from(open_result)
                )));
            }

            let info_result = ffmpeg_sys_next::avformat_find_stream_info(context, ptr::null_mut());
            if info_result < 0 {
                ffmpeg_sys_next::avformat_close_input(&mut context);
                custom_io.release();
                return Err(ReelcutError::UnsupportedFormat(format!(
                    "could not read stream information ({})",
                    ffmpeg_next::Error::from(info_result)
                )));
            }

            Ok(Self {
                input: ManuallyDrop::new(Input::wrap(context)),
                custom_io: Some(custom_io),
            })
        }
    }
}

impl Deref for Demuxer {
    type Target = Input;

    fn deref(&self) -> &Input {
        &self.input
    }
}

impl DerefMut for Demuxer {
    fn deref_mut(&mut self) -> &mut Input {
        &mut self.input
    }
}

impl Drop for Demuxer {
    fn drop(&mut self) {
        // SAFETY: the format context is closed before the I/O context it
        // reads through is freed.
        unsafe {
            ManuallyDrop::drop(&mut self.input);
            if let Some(custom_io) = self.custom_io.as_mut() {
                custom_io.release();
            }
        }
    }
}

/// An FFmpeg output (muxer) context writing into a growable memory buffer.
///
/// Call [`into_bytes`](MemoryOutput::into_bytes) after the trailer has been
/// written to take the muxed bytes. Dropping an output without calling it
/// discards everything written so far.
pub(crate) struct MemoryOutput {
    output: ManuallyDrop<Output>,
}

// SAFETY: exclusively owned, see `Demuxer`.
unsafe impl Send for MemoryOutput {}

impl MemoryOutput {
    /// Allocate a muxer for the FFmpeg format `muxer_name` (e.g. `"mp4"`).
    pub(crate) fn new(muxer_name: &str) -> Result<Self, ReelcutError> {
        let muxer_name_c = CString::new(muxer_name).map_err(|error| {
            ReelcutError::encode(Stage::Mux, format!("invalid muxer name: {error}"))
        })?;

        // SAFETY: mirrors `avformat_alloc_output_context2` +
        // `avio_open_dyn_buf`; failures free what was allocated.
        unsafe {
            let mut context: *mut AVFormatContext = ptr::null_mut();
            let allocation_result = ffmpeg_sys_next::avformat_alloc_output_context2(
                &mut context,
                ptr::null_mut(),
                muxer_name_c.as_ptr(),
                ptr::null_mut(),
            );
            if allocation_result < 0 || context.is_null() {
                return Err(ReelcutError::UnsupportedFormat(format!(
                    "muxer '{muxer_name}' is not available in this FFmpeg build"
                )));
            }

            if ffmpeg_sys_next::avio_open_dyn_buf(&mut (*context).pb) < 0 {
                ffmpeg_sys_next::avformat_free_context(context);
                return Err(ReelcutError::encode(
                    Stage::Mux,
                    "failed to open dynamic output buffer",
                ));
            }

            Ok(Self {
                output: ManuallyDrop::new(Output::wrap(context)),
            })
        }
    }

    /// Close the dynamic buffer and return its contents.
    pub(crate) fn into_bytes(mut self) -> Vec<u8> {
        // SAFETY: `pb` is the dynamic buffer opened in `new`; it is nulled
        // after closing so `Drop` does not close it again.
        unsafe { self.close_dynamic_buffer() }
    }

    unsafe fn close_dynamic_buffer(&mut self) -> Vec<u8> {
        unsafe {
            let context = self.output.as_mut_ptr();
            if (*context).pb.is_null() {
                return Vec::new();
            }
            let mut buffer_pointer: *mut u8 = ptr::null_mut();
            let buffer_size =
                ffmpeg_sys_next::avio_close_dyn_buf((*context).pb, &mut buffer_pointer);
            (*context).pb = ptr::null_mut();

            let bytes = if buffer_size > 0 && !buffer_pointer.is_null() {
                std::slice::from_raw_parts(buffer_pointer, buffer_size as usize).to_vec()
            } else {
                Vec::new()
            };
            if !buffer_pointer.is_null() {
                ffmpeg_sys_next::av_free(buffer_pointer as *mut c_void);
            }
            bytes
        }
    }
}

impl Deref for MemoryOutput {
    type Target = Output;

    fn deref(&self) -> &Output {
        &self.output
    }
}

impl DerefMut for MemoryOutput {
    fn deref_mut(&mut self) -> &mut Output {
        &mut self.output
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        // SAFETY: prevents the context destructor from calling `avio_close`
        // on the dynamic buffer, which must go through `avio_close_dyn_buf`.
        unsafe {
            let _discarded = self.close_dynamic_buffer();
            ManuallyDrop::drop(&mut self.output);
        }
    }
}
