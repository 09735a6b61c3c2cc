//! End-to-end tests through the IEC bus and the KERNAL trap bridge.

use vdrive_core::bus::{atn, cmd};
use vdrive_core::trap::{addr, zp};
use vdrive_core::{
    decode_listing, st, Drive, DriveConfig, ErrorCode, IecBus, ImageType, KernalTraps,
    MemoryImage, Registers, VdriveError,
};

fn bus_with(kind: ImageType, name: &str, id: &str) -> IecBus<MemoryImage> {
    let mut drive = Drive::new(&DriveConfig::default());
    drive
        .mount(MemoryImage::blank(kind, name, id).unwrap(), false)
        .unwrap();
    IecBus::new(drive)
}

fn bus() -> IecBus<MemoryImage> {
    bus_with(ImageType::D64, "TESTDISK", "01")
}

#[test]
fn test_directory_listing() {
    let mut bus = bus();
    assert_eq!(bus.save(b"HELLO", &[0xAA; 600]), st::OK);

    let (program, status) = bus.load(b"$");
    assert_ne!(status & st::EOF, 0);
    assert_eq!(&program[..2], &[0x01, 0x04]);

    let lines = decode_listing(&program);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].blocks, 0);
    assert!(lines[0].raw.starts_with(b"\x12\"TESTDISK        \" 01 2A"));
    assert_eq!(lines[1].blocks, 3);
    assert_eq!(lines[1].raw, b"   \"HELLO\"            PRG  ".to_vec());
    assert_eq!(lines[2].blocks, 661);
    assert!(lines[2].raw.starts_with(b"BLOCKS FREE."));
}

#[test]
fn test_listing_pattern() {
    let mut bus = bus();
    bus.save(b"ALPHA", b"1");
    bus.save(b"BETA", b"2");
    let (program, _) = bus.load(b"$0:B*");
    let lines = decode_listing(&program);
    assert_eq!(lines.len(), 3);
    assert!(lines[1].raw.starts_with(b"   \"BETA\""));
}

#[test]
fn test_eoi_marks_last_byte() {
    let mut bus = bus();
    bus.open_channel(2, b"THREE,S,W");

    bus.out_atn(atn::LISTEN | 8);
    bus.out_sec(cmd::DATA | 2);
    assert_eq!(bus.out(b'A', false), st::OK);
    assert_eq!(bus.out(b'B', false), st::OK);
    assert_eq!(bus.out(b'C', true), st::OK);
    bus.out_atn(atn::UNLISTEN | 0x0F);
    bus.close_channel(2);

    bus.open_channel(2, b"THREE,S,R");
    let (data, status) = bus.receive(2);
    assert_eq!(data, b"ABC");
    assert_ne!(status & st::EOF, 0);
    bus.close_channel(2);
}

#[test]
fn test_scratch_reports_count() {
    let mut bus = bus();
    bus.save(b"JUNK", &[0; 300]);
    bus.save(b"KEEP", b"K");
    let free_before = bus.drive().disk().unwrap().bam.blocks_free();

    bus.command(b"S0:JUNK");
    assert_eq!(bus.read_status(), "01,FILES SCRATCHED,01,00");
    assert_eq!(
        bus.drive().disk().unwrap().bam.blocks_free(),
        free_before + 2
    );

    let (_, status) = bus.load(b"JUNK");
    assert_ne!(status & st::READ_TIMEOUT, 0);
    assert_eq!(bus.read_status(), "62,FILE NOT FOUND,00,00");
    let (data, _) = bus.load(b"KEEP");
    assert_eq!(data, b"K");
}

#[test]
fn test_save_with_replace() {
    let mut bus = bus();
    bus.save(b"PROG", b"OLD CONTENT");
    bus.save(b"PROG", b"X");
    assert_eq!(bus.read_status(), "63,FILE EXISTS,00,00");

    bus.save(b"@0:PROG", b"NEW");
    assert_eq!(bus.read_status(), "00,OK,00,00");
    let (data, _) = bus.load(b"PROG");
    assert_eq!(data, b"NEW");
    assert_eq!(bus.drive().disk().unwrap().bam.blocks_free(), 663);
}

#[test]
fn test_append_mode() {
    let mut bus = bus();
    bus.write_file(2, b"LOG,S,W", b"LINE 1\r");
    bus.write_file(2, b"LOG,S,A", b"LINE 2\r");
    bus.open_channel(2, b"LOG,S,R");
    let (data, _) = bus.receive(2);
    bus.close_channel(2);
    assert_eq!(data, b"LINE 1\rLINE 2\r");
}

#[test]
fn test_remount_persists() {
    let mut bus = bus();
    let data: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
    bus.save(b"KEEPER", &data);
    let image = bus.drive_mut().unmount().unwrap();

    let mut drive = Drive::new(&DriveConfig::default());
    drive.mount(image, false).unwrap();
    let mut bus = IecBus::new(drive);
    let (loaded, _) = bus.load(b"KEEPER");
    assert_eq!(loaded, data);
}

#[test]
fn test_host_file_image() {
    let path = std::env::temp_dir().join(format!("vdrive-test-{}.d64", std::process::id()));
    let blank = MemoryImage::blank(ImageType::D64, "ONDISK", "HF").unwrap();
    std::fs::write(&path, blank.as_bytes()).unwrap();

    {
        let mut drive = Drive::new(&DriveConfig::default());
        drive.mount_path(&path).unwrap();
        let mut bus = IecBus::new(drive);
        assert_eq!(bus.save(b"FILE", b"STORED"), st::OK);
        // Dropping the drive writes back the BAM
    }

    let mut drive = Drive::new(&DriveConfig::default());
    drive.mount_path(&path).unwrap();
    assert_eq!(drive.disk().unwrap().bam.blocks_free(), 663);
    let mut bus = IecBus::new(drive);
    let (data, _) = bus.load(b"FILE");
    assert_eq!(data, b"STORED");

    drop(bus);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_format_detection() {
    let mut drive: Drive<MemoryImage> = Drive::new(&DriveConfig::default());

    drive.mount(MemoryImage::new(vec![0; 174_848]), false).unwrap();
    let desc = drive.disk().unwrap().desc().clone();
    assert_eq!(desc.kind, ImageType::D64);
    assert_eq!(desc.num_tracks, 35);
    assert!(!desc.has_error_info());

    drive.mount(MemoryImage::new(vec![0; 822_400]), false).unwrap();
    let desc = drive.disk().unwrap().desc().clone();
    assert_eq!(desc.kind, ImageType::D81);
    assert!(desc.has_error_info());

    let mut x64 = vec![0u8; 64 + 174_848];
    x64[..6].copy_from_slice(b"C\x15\x41\x64\x01\x02");
    x64[7] = 35;
    drive.mount(MemoryImage::new(x64), false).unwrap();
    assert_eq!(drive.disk().unwrap().kind(), ImageType::X64);

    let err = drive.mount(MemoryImage::new(vec![0; 1000]), false);
    assert!(matches!(err, Err(VdriveError::UnknownFormat(1000))));
    assert!(!drive.is_mounted());
    assert_eq!(drive.error().code, ErrorCode::NotReady);
}

#[test]
fn test_sector_error_info() {
    let mut bytes = MemoryImage::blank(ImageType::D64, "BAD", "EE")
        .unwrap()
        .into_inner();
    // Error info for every sector, with 17/0 (first data block) bad
    let mut info = vec![1u8; 683];
    info[16 * 21] = 5;
    bytes.extend_from_slice(&info);

    let mut drive = Drive::new(&DriveConfig::default());
    drive.mount(MemoryImage::new(bytes), false).unwrap();
    let mut bus = IecBus::new(drive);
    bus.save(b"DATA", b"123");
    let (data, _) = bus.load(b"DATA");
    assert!(data.is_empty());
    assert_eq!(bus.read_status(), "23,READ ERROR,17,00");
}

#[test]
fn test_write_protected_mount() {
    let config = DriveConfig {
        write_protect: true,
        ..DriveConfig::default()
    };
    let mut drive = Drive::new(&config);
    drive
        .mount(MemoryImage::blank(ImageType::D64, "RO", "01").unwrap(), false)
        .unwrap();
    let mut bus = IecBus::new(drive);
    bus.save(b"NOPE", b"1");
    assert_eq!(bus.read_status(), "26,WRITE PROTECT ON,00,00");
    bus.command(b"S:ANY");
    assert_eq!(bus.read_status(), "26,WRITE PROTECT ON,00,00");
}

#[test]
fn test_d81_round_trip() {
    let mut bus = bus_with(ImageType::D81, "BIG", "81");
    let data = vec![0x5A; 10_000];
    bus.save(b"LARGE", &data);
    let (loaded, _) = bus.load(b"LARGE");
    assert_eq!(loaded, data);
    let (program, _) = bus.load(b"$");
    let lines = decode_listing(&program);
    assert_eq!(lines[1].blocks, 40);
    assert_eq!(lines[2].blocks, 3160 - 40);
}

/// A 6510 host driving the bus only through trapped KERNAL calls.
struct Kernal {
    traps: KernalTraps,
    regs: Registers,
    ram: Vec<u8>,
}

impl Kernal {
    const RETURN: u16 = 0xC000;

    fn new() -> Self {
        Self {
            traps: KernalTraps::from_config(&DriveConfig::default()),
            regs: Registers::default(),
            ram: vec![0; 0x10000],
        }
    }

    /// JSR to a trapped routine; returns A.
    fn call(&mut self, bus: &mut IecBus<MemoryImage>, pc: u16, a: u8) -> u8 {
        assert!(self.traps.check(pc));
        // JSR pushes the address of its last byte
        let [lo, hi] = (Self::RETURN - 1).to_le_bytes();
        self.regs.sp = 0xFD;
        self.ram[0x1FF] = hi;
        self.ram[0x1FE] = lo;
        self.regs.a = a;
        let next = self.traps.process(pc, &mut self.regs, &mut self.ram, bus);
        assert_eq!(next, Self::RETURN);
        self.regs.a
    }

    fn open(&mut self, bus: &mut IecBus<MemoryImage>, sa: u8, name: &[u8]) {
        self.call(bus, addr::LISTEN, 8);
        self.call(bus, addr::SECOND, 0xF0 | sa);
        for (i, &b) in name.iter().enumerate() {
            self.ram[zp::EOI_FLAG] = if i + 1 == name.len() { 0x80 } else { 0 };
            self.call(bus, addr::CIOUT, b);
        }
        self.call(bus, addr::UNLSN, 0);
    }

    fn close(&mut self, bus: &mut IecBus<MemoryImage>, sa: u8) {
        self.call(bus, addr::LISTEN, 8);
        self.call(bus, addr::SECOND, 0xE0 | sa);
        self.call(bus, addr::UNLSN, 0);
    }

    fn load(&mut self, bus: &mut IecBus<MemoryImage>, name: &[u8]) -> Vec<u8> {
        self.ram[zp::STATUS] = 0;
        self.open(bus, 0, name);
        self.call(bus, addr::TALK, 8);
        self.call(bus, addr::TKSA, 0x60);
        let mut data = Vec::new();
        while self.ram[zp::STATUS] == 0 {
            let byte = self.call(bus, addr::ACPTR, 0);
            if self.regs.p & 0x01 != 0 {
                break;
            }
            data.push(byte);
        }
        self.call(bus, addr::UNTLK, 0);
        self.close(bus, 0);
        data
    }

    fn save(&mut self, bus: &mut IecBus<MemoryImage>, name: &[u8], data: &[u8]) {
        self.open(bus, 1, name);
        self.call(bus, addr::LISTEN, 8);
        self.call(bus, addr::SECOND, 0x61);
        for (i, &b) in data.iter().enumerate() {
            self.ram[zp::EOI_FLAG] = if i + 1 == data.len() { 0x80 } else { 0 };
            self.call(bus, addr::CIOUT, b);
        }
        self.call(bus, addr::UNLSN, 0);
        self.close(bus, 1);
    }
}

#[test]
fn test_kernal_save_and_load() {
    let mut bus = bus();
    let mut kernal = Kernal::new();
    let program = [0x01, 0x08, 0x0B, 0x08, 0x0A, 0x00, 0x99, 0x22, 0x48, 0x49, 0x22, 0x00];

    kernal.save(&mut bus, b"HI", &program);
    assert_eq!(kernal.ram[zp::SESSION_FLAGS] & 0xC0, 0);

    let loaded = kernal.load(&mut bus, b"HI");
    assert_eq!(loaded, program);
    assert_ne!(kernal.ram[zp::STATUS] & st::EOF, 0);
}

#[test]
fn test_kernal_device_not_present() {
    let mut bus = bus();
    let mut kernal = Kernal::new();
    kernal.call(&mut bus, addr::LISTEN, 9);
    assert_eq!(kernal.ram[zp::STATUS], st::NOT_PRESENT);
    assert_eq!(kernal.ram[zp::FA], 9);
}

#[test]
fn test_kernal_load_missing_file() {
    let mut bus = bus();
    let mut kernal = Kernal::new();
    let loaded = kernal.load(&mut bus, b"MISSING");
    assert!(loaded.is_empty());
    assert_ne!(kernal.ram[zp::STATUS] & st::READ_TIMEOUT, 0);
    assert_eq!(bus.read_status(), "62,FILE NOT FOUND,00,00");
}
