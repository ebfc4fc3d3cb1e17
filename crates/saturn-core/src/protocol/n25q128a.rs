//! N25Q128A command driver
//!
//! Each operation is one chip-select framed transaction. Erase and program
//! return only after the status register reports the operation finished and
//! the flag status register shows no failure bit for that operation, so the
//! caller may issue the next mutating command immediately.

use crate::error::{ChipOperation, Error, OperationKind, Result};
use crate::protocol::opcodes::{self, FlagStatus, Status};
use crate::transport::Transport;
use std::time::{Duration, Instant};

/// Identification data returned by RDID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashIdentity {
    /// JEDEC manufacturer id
    pub manufacturer_id: u8,
    /// Device id (wire byte 2 high, wire byte 1 low)
    pub device_id: u16,
    /// Factory unique id
    pub unique_id: [u8; opcodes::UNIQUE_ID_LEN],
}

impl FlashIdentity {
    /// Decode a raw RDID response
    pub fn from_bytes(raw: &[u8; opcodes::RDID_LEN]) -> Self {
        let mut unique_id = [0u8; opcodes::UNIQUE_ID_LEN];
        unique_id.copy_from_slice(&raw[3..]);
        Self {
            manufacturer_id: raw[0],
            device_id: ((raw[2] as u16) << 8) | raw[1] as u16,
            unique_id,
        }
    }

    /// Whether this is the N25Q128A the Saturn module expects
    pub fn is_expected(&self) -> bool {
        self.manufacturer_id == opcodes::MANUFACTURER_ID && self.device_id == opcodes::DEVICE_ID
    }
}

impl core::fmt::Display for FlashIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "manufacturer 0x{:02X}, device 0x{:04X}, unique id ",
            self.manufacturer_id, self.device_id
        )?;
        for byte in &self.unique_id {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Status polling behaviour after erase/program
///
/// The default polls back-to-back with no limit, which is what the chip
/// needs: a bulk erase can take minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between status reads in microseconds (0 = tight loop)
    pub interval_us: u32,
    /// Give up after this long; `None` polls until the chip is ready
    pub timeout_us: Option<u64>,
}

impl PollConfig {
    /// Set the delay between status reads
    pub fn interval_us(mut self, interval_us: u32) -> Self {
        self.interval_us = interval_us;
        self
    }

    /// Give up once `timeout_us` microseconds have elapsed since the
    /// operation was issued
    pub fn timeout_us(mut self, timeout_us: u64) -> Self {
        self.timeout_us = Some(timeout_us);
        self
    }

    /// Point in time after which polling gives up, if bounded
    fn deadline(&self, start: Instant) -> Option<Instant> {
        self.timeout_us
            .and_then(|timeout| start.checked_add(Duration::from_micros(timeout)))
    }
}

/// N25Q128A driver over a transport
pub struct N25q128a<T: Transport> {
    transport: T,
    poll: PollConfig,
}

impl<T: Transport> N25q128a<T> {
    /// Create a driver using the given transport and polling behaviour
    pub fn new(transport: T, poll: PollConfig) -> Self {
        Self { transport, poll }
    }

    /// Access the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the driver and return the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Run `f` inside a chip-select framed transaction.
    ///
    /// The transaction is ended even if `f` fails; the first error wins.
    fn transaction<R>(&mut self, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        self.transport.begin()?;
        let result = f(&mut self.transport);
        let end = self.transport.end();
        let value = result?;
        end?;
        Ok(value)
    }

    /// Read the identification bytes
    pub fn identify(&mut self) -> Result<FlashIdentity> {
        log::trace!("RDID");
        let mut raw = [0u8; opcodes::RDID_LEN];
        self.transaction(|t| {
            t.write(&[opcodes::RDID])?;
            t.read(&mut raw)
        })?;
        Ok(FlashIdentity::from_bytes(&raw))
    }

    /// Read `buf.len()` bytes starting at `address`.
    ///
    /// The length is not checked against the device size; reads past the
    /// end wrap on the chip.
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        log::trace!("READ 0x{:06X} len={}", address, buf.len());
        let addr = opcodes::encode_address(address);
        self.transaction(|t| {
            t.write(&[opcodes::READ, addr[0], addr[1], addr[2]])?;
            t.read(buf)
        })
    }

    /// Read `len` bytes starting at `address` into a new buffer
    pub fn read_vec(&mut self, address: u32, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(address, &mut buf)?;
        Ok(buf)
    }

    /// Read the status register
    pub fn read_status(&mut self) -> Result<Status> {
        Ok(Status::from_bits_retain(self.read_register(opcodes::RDSR)?))
    }

    /// Read the flag status register
    pub fn read_flag_status(&mut self) -> Result<FlagStatus> {
        Ok(FlagStatus::from_bits_retain(
            self.read_register(opcodes::RFSR)?,
        ))
    }

    fn read_register(&mut self, opcode: u8) -> Result<u8> {
        let mut value = [0u8; 1];
        self.transaction(|t| {
            t.write(&[opcode])?;
            t.read(&mut value)
        })?;
        Ok(value[0])
    }

    /// Send the Write Enable command
    pub fn write_enable(&mut self) -> Result<()> {
        log::trace!("WREN");
        self.transaction(|t| t.write(&[opcodes::WREN]))
    }

    /// Send the Write Disable command
    pub fn write_disable(&mut self) -> Result<()> {
        log::trace!("WRDI");
        self.transaction(|t| t.write(&[opcodes::WRDI]))
    }

    /// Erase the whole chip and wait for completion
    pub fn bulk_erase(&mut self) -> Result<()> {
        log::trace!("BE");
        self.transaction(|t| t.write(&[opcodes::BE]))?;
        self.wait_complete(ChipOperation::BulkErase)
    }

    /// Erase one 64 KiB sector and wait for completion
    pub fn sector_erase(&mut self, sector: u8) -> Result<()> {
        let address = sector as u32 * opcodes::SECTOR_SIZE as u32;
        log::trace!("SE sector {} (0x{:06X})", sector, address);
        let addr = opcodes::encode_address(address);
        self.transaction(|t| t.write(&[opcodes::SE, addr[0], addr[1], addr[2]]))?;
        self.wait_complete(ChipOperation::SectorErase { sector })
    }

    /// Program up to one page of data at the start of `page` and wait for
    /// completion.
    ///
    /// Address and data are sent in the same transaction.
    pub fn page_program(&mut self, page: u16, data: &[u8]) -> Result<()> {
        if data.len() > opcodes::PAGE_SIZE {
            return Err(Error::PageOverflow { len: data.len() });
        }
        let address = page as u32 * opcodes::PAGE_SIZE as u32;
        log::trace!("PP page {} (0x{:06X}) len={}", page, address, data.len());
        let addr = opcodes::encode_address(address);
        self.transaction(|t| {
            t.write(&[opcodes::PP, addr[0], addr[1], addr[2]])?;
            t.write(data)
        })?;
        self.wait_complete(ChipOperation::PageProgram { page })
    }

    /// Poll until the write-in-progress bit clears, then check the flag
    /// status register for the failure bits of `operation`.
    fn wait_complete(&mut self, operation: ChipOperation) -> Result<()> {
        let deadline = self.poll.deadline(Instant::now());
        let mut polls: u64 = 0;

        loop {
            let status = self.read_status()?;
            polls += 1;
            if !status.is_busy() {
                break;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(Error::Timeout { operation });
            }
            if self.poll.interval_us > 0 {
                self.transport.delay_us(self.poll.interval_us);
            }
        }
        log::trace!("{} complete after {} status reads", operation, polls);

        let flags = self.read_flag_status()?;
        let failure = match operation.kind() {
            OperationKind::Erase => FlagStatus::ERASE_FAILURE,
            OperationKind::Program => FlagStatus::PROGRAM_FAILURE,
        };
        if flags.intersects(failure) {
            log::debug!("{} failed, flag status 0x{:02X}", operation, flags.bits());
            return Err(Error::ChipOperationFailed {
                operation,
                flag_status: flags.bits(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Level, Pin};
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Begin,
        Write(Vec<u8>),
        Read(usize),
        End,
        Delay(u32),
    }

    /// Transport that records every call and answers reads from a script
    #[derive(Default)]
    struct ScriptedTransport {
        events: Vec<Event>,
        responses: VecDeque<Vec<u8>>,
        fallback: Option<Vec<u8>>,
        fail_on_write: Option<usize>,
        writes: usize,
    }

    impl ScriptedTransport {
        fn respond(mut self, bytes: &[u8]) -> Self {
            self.responses.push_back(bytes.to_vec());
            self
        }

        /// Answer every read after the script runs out with `bytes`
        fn respond_forever(mut self, bytes: &[u8]) -> Self {
            self.fallback = Some(bytes.to_vec());
            self
        }

        fn writes(&self) -> Vec<Vec<u8>> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Write(data) => Some(data.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn begin(&mut self) -> Result<()> {
            self.events.push(Event::Begin);
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.writes += 1;
            if self.fail_on_write == Some(self.writes) {
                return Err(Error::Transport("write failed".into()));
            }
            self.events.push(Event::Write(data.to_vec()));
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            self.events.push(Event::Read(buf.len()));
            let response = self
                .responses
                .pop_front()
                .or_else(|| self.fallback.clone())
                .ok_or_else(|| Error::Transport("no scripted response".into()))?;
            buf.copy_from_slice(&response[..buf.len()]);
            Ok(())
        }

        fn end(&mut self) -> Result<()> {
            self.events.push(Event::End);
            Ok(())
        }

        fn set_pin(&mut self, _pin: Pin, _level: Level) -> Result<()> {
            Ok(())
        }

        fn delay_us(&mut self, us: u32) {
            self.events.push(Event::Delay(us));
        }
    }

    fn driver(transport: ScriptedTransport) -> N25q128a<ScriptedTransport> {
        N25q128a::new(transport, PollConfig::default())
    }

    #[test]
    fn test_identify_decodes_response() {
        let mut raw = vec![0x20, 0xBA, 0x18];
        raw.extend(0..17u8);
        let mut flash = driver(ScriptedTransport::default().respond(&raw));

        let id = flash.identify().unwrap();
        assert_eq!(id.manufacturer_id, 0x20);
        assert_eq!(id.device_id, 0x18BA);
        assert_eq!(id.unique_id[0], 0);
        assert_eq!(id.unique_id[16], 16);
        assert!(id.is_expected());

        let t = flash.into_inner();
        assert_eq!(
            t.events,
            vec![
                Event::Begin,
                Event::Write(vec![0x9F]),
                Event::Read(20),
                Event::End
            ]
        );
    }

    #[test]
    fn test_identify_rejects_wrong_manufacturer() {
        let mut raw = [0u8; 20];
        raw[0] = 0x21;
        raw[1] = 0xBA;
        raw[2] = 0x18;
        assert!(!FlashIdentity::from_bytes(&raw).is_expected());
    }

    #[test]
    fn test_read_encodes_address_big_endian() {
        let mut flash = driver(ScriptedTransport::default().respond(&[1, 2, 3, 4]));
        let data = flash.read_vec(0x0A0B0C, 4).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
        assert_eq!(
            flash.into_inner().events,
            vec![
                Event::Begin,
                Event::Write(vec![0x03, 0x0A, 0x0B, 0x0C]),
                Event::Read(4),
                Event::End
            ]
        );
    }

    #[test]
    fn test_write_enable_disable_are_single_byte_transactions() {
        let mut flash = driver(ScriptedTransport::default());
        flash.write_enable().unwrap();
        flash.write_disable().unwrap();
        assert_eq!(
            flash.into_inner().events,
            vec![
                Event::Begin,
                Event::Write(vec![0x06]),
                Event::End,
                Event::Begin,
                Event::Write(vec![0x04]),
                Event::End
            ]
        );
    }

    #[test]
    fn test_sector_erase_polls_until_ready() {
        let t = ScriptedTransport::default()
            .respond(&[0x03])
            .respond(&[0x03])
            .respond(&[0x01])
            .respond(&[0x00])
            .respond(&[0x80]);
        let mut flash = driver(t);
        flash.sector_erase(2).unwrap();

        let writes = flash.into_inner().writes();
        assert_eq!(writes[0], vec![0xD8, 0x02, 0x00, 0x00]);
        // Four status reads, then one flag status read
        assert_eq!(&writes[1..5], &[vec![0x05], vec![0x05], vec![0x05], vec![0x05]]);
        assert_eq!(writes[5], vec![0x70]);
        assert_eq!(writes.len(), 6);
    }

    #[test]
    fn test_sector_erase_flag_failure() {
        let t = ScriptedTransport::default()
            .respond(&[0x00])
            .respond(&[0x82]);
        let mut flash = driver(t);
        let err = flash.sector_erase(255).unwrap_err();
        assert!(matches!(
            err,
            Error::ChipOperationFailed {
                operation: ChipOperation::SectorErase { sector: 255 },
                flag_status: 0x82
            }
        ));
    }

    #[test]
    fn test_bulk_erase_flag_failure() {
        let t = ScriptedTransport::default()
            .respond(&[0x00])
            .respond(&[0x04]);
        let mut flash = driver(t);
        let err = flash.bulk_erase().unwrap_err();
        assert_eq!(err.to_string(), "flash bulk erase failed");
        assert_eq!(flash.into_inner().writes()[0], vec![0xC7]);
    }

    #[test]
    fn test_page_program_single_transaction() {
        let t = ScriptedTransport::default()
            .respond(&[0x00])
            .respond(&[0x80]);
        let mut flash = driver(t);
        let data = [0xAAu8; 44];
        flash.page_program(0x0102, &data).unwrap();

        let events = flash.into_inner().events;
        assert_eq!(
            &events[..4],
            &[
                Event::Begin,
                Event::Write(vec![0x02, 0x01, 0x02, 0x00]),
                Event::Write(data.to_vec()),
                Event::End
            ]
        );
    }

    #[test]
    fn test_page_program_flag_failure_uses_program_mask() {
        // 0x02 alone is an erase failure bit pattern, not a program one
        let t = ScriptedTransport::default()
            .respond(&[0x00])
            .respond(&[0x02]);
        let mut flash = driver(t);
        flash.page_program(0, &[0x00]).unwrap();

        let t = ScriptedTransport::default()
            .respond(&[0x00])
            .respond(&[0x01]);
        let mut flash = driver(t);
        let err = flash.page_program(9, &[0x00]).unwrap_err();
        assert_eq!(err.to_string(), "flash program failed");
    }

    #[test]
    fn test_page_program_rejects_oversized_data() {
        let mut flash = driver(ScriptedTransport::default());
        let err = flash.page_program(0, &[0u8; 257]).unwrap_err();
        assert!(matches!(err, Error::PageOverflow { len: 257 }));
        assert!(flash.into_inner().events.is_empty());
    }

    #[test]
    fn test_poll_timeout() {
        let t = ScriptedTransport::default().respond_forever(&[0x01]);
        let mut flash = N25q128a::new(t, PollConfig::default().interval_us(10).timeout_us(2_000));
        let err = flash.bulk_erase().unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                operation: ChipOperation::BulkErase
            }
        ));
        let events = flash.into_inner().events;
        assert!(events.iter().any(|e| matches!(e, Event::Delay(10))));
    }

    #[test]
    fn test_poll_timeout_is_elapsed_time_without_interval() {
        // A tight loop must run for the whole timeout, not one read per
        // microsecond of budget
        let t = ScriptedTransport::default().respond_forever(&[0x01]);
        let mut flash = N25q128a::new(t, PollConfig::default().timeout_us(5_000));
        let start = Instant::now();
        let err = flash.sector_erase(1).unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(start.elapsed() >= Duration::from_micros(5_000));
        assert!(!flash
            .into_inner()
            .events
            .iter()
            .any(|e| matches!(e, Event::Delay(_))));
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let t = ScriptedTransport::default()
            .respond(&[0x01])
            .respond(&[0x00])
            .respond(&[0x80]);
        let mut flash = N25q128a::new(t, PollConfig::default().timeout_us(u64::MAX));
        flash.bulk_erase().unwrap();
    }

    #[test]
    fn test_transport_failure_still_ends_transaction() {
        let t = ScriptedTransport {
            fail_on_write: Some(1),
            ..Default::default()
        };
        let mut flash = driver(t);
        let err = flash.write_enable().unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(flash.into_inner().events, vec![Event::Begin, Event::End]);
    }
}
