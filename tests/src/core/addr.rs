use dyna_core::addr::*;

#[test]
fn test_page_math() {
    assert_eq!(page_index(0x8000_1234), 0x80001);
    assert_eq!(page_base(0x8000_1FFC), 0x8000_1000);
    assert_eq!(PAGE_SIZE, 4096);
}

#[test]
fn test_segments() {
    assert!(is_unmapped(0x8000_0000));
    assert!(is_unmapped(0xBFFF_FFFF));
    assert!(!is_unmapped(0x7FFF_FFFF));
    assert!(!is_unmapped(0xC000_0000));

    assert!(is_rom_window(0x9000_0000));
    assert!(is_rom_window(0xB000_1000));
    assert!(!is_rom_window(0x8000_0000));
    assert!(!is_rom_window(0xA000_0000));
}

#[test]
fn test_backing_for_ram_and_rom() {
    assert_eq!(
        backing_for(0x8000_1234),
        Some(Backing::Ram { phys: 0x1000 })
    );
    assert_eq!(
        backing_for(0xA040_0010),
        Some(Backing::Ram { phys: 0x40_0000 })
    );
    // Cartridge pages are backed lazily.
    assert_eq!(backing_for(0xB000_0000), None);
    assert_eq!(rom_backing(0xB000_2345), Backing::Rom { offset: 0x2000 });
    assert_eq!(rom_backing(0x9012_3456), Backing::Rom { offset: 0x12_3000 });
}

#[test]
fn test_aliases() {
    assert_eq!(aliases(0x8000_1000), [Some(0x8000_1000), Some(0xA000_1000)]);
    assert_eq!(aliases(0xA000_1000), [Some(0xA000_1000), Some(0x8000_1000)]);
    assert_eq!(aliases(0x0040_0000), [Some(0x0040_0000), None]);
    assert_eq!(aliases(0xC000_0000), [Some(0xC000_0000), None]);
}
