use dyna_core::{Backing, Block, CodeRegion, FuncId, Function, PAGE_SIZE};

#[test]
fn test_func_id_bits() {
    let id = FuncId::new(7, 3);
    assert_eq!(id.index(), 7);
    assert_eq!(id.generation(), 3);
    assert_eq!(id.to_bits(), (3u64 << 32) | 7);
    assert_eq!(FuncId::from_bits(id.to_bits()), id);
    assert_ne!(FuncId::new(7, 4), id);
}

#[test]
fn test_function_entries() {
    let region = CodeRegion { offset: 64, len: 48 };
    let mut func = Function::new(0x8000_1000, 0x8000_1010, region);
    assert_eq!(func.entries.len(), 4);
    assert_eq!(func.page(), 0x80001);

    func.set_entry(0x8000_1000, 72);
    func.set_entry(0x8000_1008, 90);
    // Outside the range: ignored.
    func.set_entry(0x8000_1010, 99);

    assert_eq!(func.entry(0x8000_1000), Some(72));
    assert_eq!(func.entry(0x8000_1004), None);
    assert_eq!(func.entry(0x8000_1008), Some(90));
    assert_eq!(func.entry(0x8000_100A), None);
    assert_eq!(func.entry(0x8000_1010), None);

    assert!(func.contains(0x8000_100C));
    assert!(!func.contains(0x8000_1010));
    assert!(!func.contains(0x8000_0FFC));
}

#[test]
fn test_block_covers_one_page() {
    let block = Block::new(0x8000_2000, Some(Backing::Ram { phys: 0x2000 }));
    assert_eq!(block.end_address - block.start_address, PAGE_SIZE);
    assert!(block.funcs.is_empty());
}
