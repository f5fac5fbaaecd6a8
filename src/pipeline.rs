use log::info;

use crate::bin_writer;
use crate::config::ParserConfig;
use crate::errors::VgmResult;
use crate::event::{self, Event};
use crate::gd3::Gd3;
use crate::header::{ClockProfile, HeaderData};
use crate::transforms;
use crate::utils;
use crate::vgm_writer;

/// A VGM/SN76489 event stream loaded in memory, ready to be filtered,
/// transposed, quantized, and re-emitted.
///
/// Owns `(header, gd3, events)` directly; every transform is a method that
/// mutates or replaces `self.events` in place. Nothing here touches the
/// filesystem — see the `vgm-retune` binary for that.
#[derive(Debug, Clone)]
pub struct VgmPipeline {
    pub header: HeaderData,
    pub gd3: Gd3,
    pub events: Vec<Event>,
}

impl VgmPipeline {
    pub fn from_bytes(data: &[u8]) -> VgmResult<Self> {
        Self::from_bytes_with_config(data, &ParserConfig::default())
    }

    pub fn from_bytes_with_config(data: &[u8], config: &ParserConfig) -> VgmResult<Self> {
        let decompressed = utils::detect_and_decompress(data)?;

        let mut header = HeaderData::from_bytes(&decompressed)?;
        let dual_chip = header.is_dual_chip();
        header.clear_dual_chip();

        let gd3 = Gd3::from_bytes(&decompressed, header.gd3_offset as usize, config)?;

        let events = event::parse_commands(&decompressed, header.vgm_data_offset as usize, dual_chip)?;
        config.check_event_count(events.len())?;

        // Dual-chip suppression: WriteDual events never survive past parsing.
        let events: Vec<Event> = events
            .into_iter()
            .filter(|e| !matches!(e, Event::WriteDual { .. }))
            .collect();

        info!(
            "loaded VGM v{:#06x}, {} events, sn76489 clock {} Hz",
            header.version,
            events.len(),
            header.sn76489_clock
        );

        Ok(VgmPipeline {
            header,
            gd3,
            events,
        })
    }

    pub fn filter_channel(&mut self, channel: u8) {
        self.events = transforms::filter_channel(&self.events, channel);
    }

    pub fn optimize(&mut self) {
        self.events = transforms::optimize(&self.events);
    }

    pub fn optimize2(&mut self) {
        self.events = transforms::optimize2(&self.events);
    }

    pub fn transpose(&mut self, profile: ClockProfile) {
        let source_clock = self.header.sn76489_clock;
        let target_clock = profile.clock_hz();
        transforms::transpose(&mut self.events, source_clock, target_clock);
        self.header.apply_clock_profile(profile);
    }

    pub fn quantize(&mut self, rate_hz: u32) -> VgmResult<()> {
        self.events = transforms::quantize(&self.events, rate_hz)?;
        self.header.rate = rate_hz;
        Ok(())
    }

    /// The canonical retune recipe: dedup, transpose, quantize, dedup again.
    pub fn retune(&mut self, profile: ClockProfile, rate_hz: u32) -> VgmResult<()> {
        self.optimize();
        self.optimize2();
        self.optimize();
        self.transpose(profile);
        self.quantize(rate_hz)?;
        self.optimize();
        self.optimize2();
        self.optimize();
        Ok(())
    }

    pub fn to_vgm_bytes(&self) -> Vec<u8> {
        vgm_writer::write(&self.header, &self.gd3, &self.events)
    }

    /// `source_filename` is used as the packet-binary author field's fallback
    /// when `author` is blank.
    pub fn to_packet_bytes(
        &self,
        title: &str,
        author: &str,
        source_filename: &str,
    ) -> VgmResult<Vec<u8>> {
        bin_writer::write(&self.header, &self.events, title, author, source_filename)
    }
}
