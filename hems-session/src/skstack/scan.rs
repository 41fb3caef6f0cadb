//! Active scan result accumulation

use crate::skstack::line::{event, Line, ScanKey};
use hems_core::{HemsError, HemsResult, PanDescriptor};

/// Collects `key:value` lines printed during `SKSCAN`
///
/// The dongle prints one `EPANDESC` block per coordinator that answered,
/// followed by `EVENT 22` once the scan is over. Each block is recorded on its
/// own; a block opens at `EPANDESC` or, when the header is missing, at the
/// first field or at a key the open block already holds. The last block that
/// carries a meter address is the result.
#[derive(Debug, Default)]
pub struct ScanAccumulator {
    current: PanDescriptor,
    open: bool,
    found: Option<PanDescriptor>,
    complete: bool,
    descriptors: usize,
}

fn field(pan: &mut PanDescriptor, key: ScanKey) -> &mut String {
    match key {
        ScanKey::Channel => &mut pan.channel,
        ScanKey::ChannelPage => &mut pan.channel_page,
        ScanKey::PanId => &mut pan.pan_id,
        ScanKey::Addr => &mut pan.addr,
        ScanKey::Lqi => &mut pan.lqi,
        ScanKey::PairId => &mut pan.pair_id,
    }
}

impl ScanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_descriptor(&mut self) {
        self.close_descriptor();
        self.open = true;
        self.descriptors += 1;
    }

    fn close_descriptor(&mut self) {
        let pan = std::mem::take(&mut self.current);
        if pan.is_found() {
            self.found = Some(pan);
        } else if self.open {
            log::debug!("dropping scan result without a meter address: {:?}", pan);
        }
        self.open = false;
    }

    /// Feed one classified line
    ///
    /// # Returns
    /// `true` once the scan-complete event has been seen
    pub fn feed(&mut self, line: &Line<'_>) -> bool {
        match line {
            Line::PanDesc => self.open_descriptor(),
            Line::ScanField { key, value } => {
                if !self.open || !field(&mut self.current, *key).is_empty() {
                    self.open_descriptor();
                }
                *field(&mut self.current, *key) = value.to_string();
            }
            line if line.is_event(event::SCAN_COMPLETE) => {
                self.close_descriptor();
                self.complete = true;
            }
            _ => {}
        }
        self.complete
    }

    /// Whether `EVENT 22` has been seen
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of descriptor blocks seen
    pub fn descriptors(&self) -> usize {
        self.descriptors
    }

    /// Validate and return the descriptor
    ///
    /// Also valid for a scan cut short: the block still open counts if it
    /// already carries an address.
    ///
    /// # Errors
    /// `HemsError::NoPanFound` when no block reported a meter address
    pub fn finish(mut self) -> HemsResult<PanDescriptor> {
        self.close_descriptor();
        self.found.ok_or(HemsError::NoPanFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(lines: &[&str]) -> ScanAccumulator {
        let mut scan = ScanAccumulator::new();
        for raw in lines {
            if scan.feed(&Line::classify(raw)) {
                break;
            }
        }
        scan
    }

    #[test]
    fn test_minimal_descriptor() {
        let scan = feed_all(&[
            "Channel:21",
            "Pan ID:8888",
            "Addr:001D129012345678",
            "EVENT 22 FE80:0000:0000:0000:021D:1291:0000:0001 0",
        ]);
        assert!(scan.is_complete());
        let pan = scan.finish().unwrap();
        assert_eq!(pan.channel, "21");
        assert_eq!(pan.pan_id, "8888");
        assert_eq!(pan.addr, "001D129012345678");
    }

    #[test]
    fn test_full_epandesc_block() {
        let scan = feed_all(&[
            "SKSCAN 2 FFFFFFFF 6 0",
            "OK",
            "EVENT 20 FE80:0000:0000:0000:021D:1291:0000:0001 0",
            "EPANDESC",
            "  Channel:21",
            "  Channel Page:09",
            "  Pan ID:8888",
            "  Addr:001D129012345678",
            "  LQI:E1",
            "  Side:0",
            "  PairID:00ABCDEF",
            "EVENT 22 FE80:0000:0000:0000:021D:1291:0000:0001 0",
        ]);
        assert_eq!(scan.descriptors(), 1);
        let pan = scan.finish().unwrap();
        assert_eq!(pan.channel_page, "09");
        assert_eq!(pan.lqi, "E1");
        assert_eq!(pan.pair_id, "00ABCDEF");
    }

    #[test]
    fn test_blocks_are_not_merged() {
        let scan = feed_all(&[
            "EPANDESC",
            "  Channel:21",
            "  Channel Page:09",
            "  Pan ID:8888",
            "  Addr:001D129012345678",
            "  LQI:E1",
            "EPANDESC",
            "  Channel:33",
            "  Pan ID:9999",
            "  LQI:40",
            "EVENT 22 FE80:0000:0000:0000:021D:1291:0000:0001 0",
        ]);
        assert_eq!(scan.descriptors(), 2);
        let pan = scan.finish().unwrap();
        assert_eq!(pan.channel, "21");
        assert_eq!(pan.pan_id, "8888");
        assert_eq!(pan.addr, "001D129012345678");
        assert_eq!(pan.lqi, "E1");
    }

    #[test]
    fn test_last_complete_block_wins() {
        let scan = feed_all(&[
            "EPANDESC",
            "  Channel:21",
            "  Pan ID:8888",
            "  Addr:001D129012345678",
            "  PairID:00ABCDEF",
            "EPANDESC",
            "  Channel:33",
            "  Pan ID:9999",
            "  Addr:001D1290AAAAAAAA",
            "EVENT 22 FE80:0000:0000:0000:021D:1291:0000:0001 0",
        ]);
        let pan = scan.finish().unwrap();
        assert_eq!(pan.channel, "33");
        assert_eq!(pan.addr, "001D1290AAAAAAAA");
        assert_eq!(pan.pair_id, "");
    }

    #[test]
    fn test_repeated_key_opens_block_without_header() {
        let scan = feed_all(&[
            "Channel:21",
            "Pan ID:8888",
            "Addr:001D129012345678",
            "Channel:33",
            "Pan ID:9999",
        ]);
        assert_eq!(scan.descriptors(), 2);
        assert!(!scan.is_complete());
        let pan = scan.finish().unwrap();
        assert_eq!(pan.channel, "21");
    }

    #[test]
    fn test_unfinished_scan_keeps_open_block() {
        let scan = feed_all(&[
            "OK",
            "EVENT 20 FE80:0000:0000:0000:021D:1291:0000:0001 0",
            "EPANDESC",
            "  Channel:21",
            "  Pan ID:8888",
            "  Addr:001D129012345678",
        ]);
        assert!(!scan.is_complete());
        assert_eq!(scan.finish().unwrap().addr, "001D129012345678");
    }

    #[test]
    fn test_missing_addr_fails() {
        let scan = feed_all(&[
            "Channel:21",
            "Pan ID:8888",
            "EVENT 22 FE80:0000:0000:0000:021D:1291:0000:0001 0",
        ]);
        assert!(scan.is_complete());
        assert!(matches!(scan.finish(), Err(HemsError::NoPanFound)));
    }

    #[test]
    fn test_lines_after_completion_ignored_by_caller() {
        let scan = feed_all(&[
            "EVENT 22 FE80:0000:0000:0000:021D:1291:0000:0001 0",
            "Addr:001D129012345678",
        ]);
        assert!(matches!(scan.finish(), Err(HemsError::NoPanFound)));
    }
}
