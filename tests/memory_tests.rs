// Arena tests: stack discipline, frames, and the free-list heap

use minic::memory::{Arena, ArenaError, Region, ALIGN};

#[test]
fn push_pop_parity_restores_the_top() {
    let mut arena = Arena::new(4096);
    let before = arena.stack_top();
    let first = arena.push(12).expect("push");
    let second = arena.push(20).expect("push");
    assert!(second > first);

    arena.pop(20).expect("pop");
    arena.pop(12).expect("pop");
    assert_eq!(arena.stack_top(), before);
}

#[test]
fn push_zero_fills() {
    let mut arena = Arena::new(4096);
    let addr = arena.push(16).expect("push");
    arena.write_bytes(addr, &[0xff; 16]).expect("write");
    arena.pop(16).expect("pop");
    // a fresh push over the same region is zeroed again
    let again = arena.push(16).expect("push");
    assert_eq!(again, addr);
    assert_eq!(arena.read_bytes(again, 16).expect("read"), &[0u8; 16]);
}

#[test]
fn unbalanced_pop_is_a_stack_underrun() {
    let mut arena = Arena::new(4096);
    arena.push(8).expect("push");
    assert_eq!(arena.pop(64), Err(ArenaError::StackUnderrun));
}

#[test]
fn unpop_re_extends_the_top() {
    let mut arena = Arena::new(4096);
    let addr = arena.push(24).expect("push");
    arena.pop(24).expect("pop");
    arena.unpop(24).expect("unpop");
    // the memory is addressable again (contents unspecified)
    arena.write_bytes(addr, &[1; 24]).expect("write");
    arena.pop(24).expect("pop");
}

#[test]
fn frames_release_everything_pushed_inside() {
    let mut arena = Arena::new(4096);
    let before = arena.stack_top();

    arena.push_frame().expect("frame");
    arena.push(40).expect("push");
    arena.push(8).expect("push");
    arena.push_frame().expect("nested frame");
    arena.push(100).expect("push");
    arena.pop_frame().expect("pop nested");
    arena.pop_frame().expect("pop outer");

    assert_eq!(arena.stack_top(), before);
}

#[test]
fn pop_frame_without_a_frame_fails() {
    let mut arena = Arena::new(4096);
    assert_eq!(arena.pop_frame(), Err(ArenaError::NoFrame));
}

#[test]
fn stack_and_heap_fail_when_they_meet() {
    let mut arena = Arena::new(256);
    arena.alloc(128).expect("heap alloc");
    let result = arena.push(512);
    assert!(matches!(result, Err(ArenaError::OutOfMemory { .. })));
}

#[test]
fn heap_alloc_zeroes_and_is_reusable_after_free() {
    let mut arena = Arena::new(4096);
    let addr = arena.alloc(32).expect("alloc");
    arena.write_bytes(addr, &[9; 32]).expect("write");
    arena.free(addr).expect("free");

    // the free block satisfies the next fit
    let again = arena.alloc(32).expect("alloc");
    assert_eq!(again, addr);
    assert_eq!(arena.read_bytes(again, 32).expect("read"), &[0u8; 32]);
}

#[test]
fn large_free_blocks_are_split() {
    let mut arena = Arena::new(4096);
    let big = arena.alloc(128).expect("alloc");
    arena.free(big).expect("free");

    let first = arena.alloc(16).expect("alloc");
    let second = arena.alloc(16).expect("alloc");
    assert_eq!(first, big);
    // the second allocation comes from the split remainder
    assert_eq!(second, big + 16);
}

#[test]
fn double_free_and_invalid_free_are_distinguished() {
    let mut arena = Arena::new(4096);
    let addr = arena.alloc(16).expect("alloc");
    arena.free(addr).expect("free");
    assert_eq!(arena.free(addr), Err(ArenaError::DoubleFree { addr }));
    assert_eq!(
        arena.free(12345),
        Err(ArenaError::InvalidFree { addr: 12345 })
    );
}

#[test]
fn null_and_wild_accesses_are_rejected() {
    let arena = Arena::new(4096);
    assert_eq!(arena.read_bytes(0, 1), Err(ArenaError::NullAccess));
    assert!(matches!(
        arena.read_bytes(2000, 4),
        Err(ArenaError::BadAccess { .. })
    ));
}

#[test]
fn reads_crossing_a_block_boundary_are_rejected() {
    let mut arena = Arena::new(4096);
    let addr = arena.alloc(16).expect("alloc");
    assert!(arena.read_bytes(addr, 16).is_ok());
    assert!(matches!(
        arena.read_bytes(addr, 64),
        Err(ArenaError::BadAccess { .. })
    ));
}

#[test]
fn scalar_roundtrip_with_sign_extension() {
    let mut arena = Arena::new(4096);
    let addr = arena.push(16).expect("push");

    arena.store_int(addr, 4, -5).expect("store");
    assert_eq!(arena.load_int(addr, 4, true).expect("load"), -5);
    assert_eq!(
        arena.load_int(addr, 4, false).expect("load"),
        0xffff_fffb_i64
    );

    arena.store_f64(addr + 8, 2.5).expect("store");
    assert_eq!(arena.load_f64(addr + 8).expect("load"), 2.5);
}

#[test]
fn regions_tell_stack_from_heap() {
    let mut arena = Arena::new(4096);
    let stack_addr = arena.push(8).expect("push");
    let heap_addr = arena.alloc(8).expect("alloc");
    assert_eq!(arena.region(stack_addr), Region::Stack);
    assert_eq!(arena.region(heap_addr), Region::Heap);
}

#[test]
fn sizes_are_rounded_to_the_alignment_unit() {
    let mut arena = Arena::new(4096);
    let before = arena.stack_top();
    arena.push(1).expect("push");
    assert_eq!(arena.stack_top(), before + ALIGN as u64);
    arena.pop(1).expect("pop");
    assert_eq!(arena.stack_top(), before);
}
