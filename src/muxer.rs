//! In-memory container writer.
//!
//! [`ContainerWriter`] owns the output (muxer) context of one run. Encode
//! stages add their streams, then the header is written once, packets are
//! interleaved as they are produced and [`finish`](ContainerWriter::finish)
//! writes the trailer and hands back the bytes. A writer dropped before
//! `finish` discards everything.

use ffmpeg_next::{
    Packet, Rational, codec::Id, format::Flags as FormatFlags, format::context::Output,
};

use crate::{
    error::{ReelcutError, Stage},
    format::OutputFormat,
    memory_io::MemoryOutput,
};

/// Muxes encoded packets into a growable memory buffer.
pub(crate) struct ContainerWriter {
    output: MemoryOutput,
    format: OutputFormat,
    header_written: bool,
    packets_written: u64,
}

impl ContainerWriter {
    pub(crate) fn new(format: OutputFormat) -> Result<Self, ReelcutError> {
        let muxer = format.descriptor().muxer;
        let output = MemoryOutput::new(muxer)?;
        log::debug!("Opened in-memory {muxer} muxer");
        Ok(Self {
            output,
            format,
            header_written: false,
            packets_written: 0,
        })
    }

    pub(crate) fn format(&self) -> OutputFormat {
        self.format
    }

    /// The raw output context, for adding streams before the header.
    pub(crate) fn output_mut(&mut self) -> &mut Output {
        &mut self.output
    }

    /// Whether encoders must put codec extradata in the container header.
    pub(crate) fn needs_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(FormatFlags::GLOBAL_HEADER)
    }

    /// Whether the muxer can store `codec` (as reported by FFmpeg).
    pub(crate) fn accepts_codec(&self, codec: Id) -> bool {
        // SAFETY: the output format pointer is valid for the writer's lifetime.
        let answer = unsafe {
            ffmpeg_sys_next::avformat_query_codec(
                self.output.format().as_ptr(),
                codec.into(),
                ffmpeg_sys_next::FF_COMPLIANCE_NORMAL as i32,
            )
        };
        answer == 1
    }

    pub(crate) fn write_header(&mut self) -> Result<(), ReelcutError> {
        if self.header_written {
            return Err(ReelcutError::InvalidState(
                "container header already written".to_string(),
            ));
        }
        self.output
            .write_header()
            .map_err(|error| ReelcutError::encode(Stage::Mux, format!("cannot write header: {error}")))?;
        self.header_written = true;
        Ok(())
    }

    /// Time base the muxer settled on for `stream_index` (valid after the
    /// header has been written).
    pub(crate) fn stream_time_base(&self, stream_index: usize) -> Result<Rational, ReelcutError> {
        self.output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| {
                ReelcutError::encode(Stage::Mux, format!("output stream {stream_index} missing"))
            })
    }

    /// Rescale `packet` from `source_time_base` into the output stream's
    /// time base and interleave it.
    pub(crate) fn write_packet(
        &mut self,
        packet: &mut Packet,
        stream_index: usize,
        source_time_base: Rational,
    ) -> Result<(), ReelcutError> {
        if !self.header_written {
            return Err(ReelcutError::InvalidState(
                "packet written before container header".to_string(),
            ));
        }
        let stream_time_base = self.stream_time_base(stream_index)?;
        packet.set_stream(stream_index);
        packet.set_position(-1);
        if packet.duration() <= 0 {
            packet.set_duration(1);
        }
        packet.rescale_ts(source_time_base, stream_time_base);
        packet
            .write_interleaved(&mut self.output)
            .map_err(|error| ReelcutError::encode(Stage::Mux, format!("write packet failed: {error}")))?;
        self.packets_written += 1;
        Ok(())
    }

    /// Write the trailer and return the finished container bytes.
    pub(crate) fn finish(mut self) -> Result<Vec<u8>, ReelcutError> {
        if !self.header_written {
            return Err(ReelcutError::InvalidState(
                "container finished before its header was written".to_string(),
            ));
        }
        self.output
            .write_trailer()
            .map_err(|error| ReelcutError::encode(Stage::Mux, format!("cannot write trailer: {error}")))?;
        let bytes = self.output.into_bytes();
        log::debug!(
            "Finished {} container: {} packets, {} bytes",
            self.format,
            self.packets_written,
            bytes.len()
        );
        Ok(bytes)
    }
}
