//! Executable Parsing Properties
//!
//! Validates the parser's guarantees on hostile images: bounded output,
//! program-header order preserved, and no panics on any truncation.

use kernel_api::{SegmentDescriptor, SegmentFlags, MAX_SEGMENTS};
use sim_kernel::test_utils::{program_with_code, too_many_segments_program, two_segment_program};
use sim_kernel::test_utils::ElfImageBuilder;
use tests_resilience::test_bootstrap;
use user_process::{parse_executable, ParseError, SpawnError};

#[test]
fn test_two_segment_layout() {
    let layout = parse_executable(&two_segment_program()).unwrap();

    assert_eq!(layout.entry_address(), 0x1000);
    assert_eq!(layout.len(), 2);
    assert_eq!(
        layout.segments()[0],
        SegmentDescriptor {
            offset_in_file: 0x40,
            length_in_file: 0x100,
            start_address: 0x1000,
            size_in_memory: 0x100,
            protection: SegmentFlags::rx(),
        }
    );
    assert_eq!(
        layout.segments()[1],
        SegmentDescriptor {
            offset_in_file: 0x140,
            length_in_file: 0x20,
            start_address: 0x2000,
            size_in_memory: 0x80,
            protection: SegmentFlags::rw(),
        }
    );
}

#[test]
fn test_every_prefix_is_rejected_without_panic() {
    let image = two_segment_program();
    for len in 0..image.len() {
        let result = parse_executable(&image[..len]);
        assert!(
            matches!(result, Err(ParseError::TruncatedImage { .. })),
            "prefix of {} bytes gave {:?}",
            len,
            result
        );
    }
    assert!(parse_executable(&image).is_ok());
}

#[test]
fn test_segment_count_never_exceeds_capacity() {
    for count in 0..=(MAX_SEGMENTS + 2) {
        let mut builder = ElfImageBuilder::new(0x1000);
        for i in 0..count as u64 {
            let start = 0x10000 * (i + 1);
            builder = builder.segment(0x40 + i * 0x10, 0x10, start, 0x10, SegmentFlags::rx());
        }
        let result = parse_executable(&builder.build());

        if count <= MAX_SEGMENTS {
            assert_eq!(result.map(|layout| layout.len()), Ok(count));
        } else {
            assert_eq!(
                result,
                Err(ParseError::TooManySegments {
                    count,
                    capacity: MAX_SEGMENTS
                })
            );
        }
    }
}

#[test]
fn test_program_header_order_is_load_order() {
    let image = ElfImageBuilder::new(0x1000)
        .segment(0x40, 0x10, 0x3000, 0x10, SegmentFlags::rw())
        .segment(0x50, 0x10, 0x1000, 0x10, SegmentFlags::rx())
        .segment(0x60, 0x10, 0x2000, 0x10, SegmentFlags::from_bits(SegmentFlags::READ))
        .build();

    let layout = parse_executable(&image).unwrap();
    let starts: Vec<u64> = layout.segments().iter().map(|s| s.start_address).collect();
    assert_eq!(starts, vec![0x3000, 0x1000, 0x2000]);
}

#[test]
fn test_spawn_reports_parse_errors() {
    let mut kernel = test_bootstrap();
    kernel.add_program("/c/big.exe", too_many_segments_program());
    kernel.add_program("/c/odd.exe", program_with_code(0x1001, vec![0x90; 4]));
    kernel.add_program(
        "/c/text.txt",
        b"#!/bin/sh\n# this script is definitely not an executable image\necho hello\n".to_vec(),
    );

    assert!(matches!(
        kernel.spawn("/c/big.exe", ""),
        Err(SpawnError::TooManySegments { count: 4, capacity: 3 })
    ));
    assert!(matches!(
        kernel.spawn("/c/odd.exe", ""),
        Err(SpawnError::UnalignedEntry { entry: 0x1001, alignment: 4 })
    ));
    assert!(matches!(
        kernel.spawn("/c/text.txt", ""),
        Err(SpawnError::MalformedHeader(_))
    ));
    assert_eq!(kernel.calls().loads, 0);
}

#[test]
fn test_spawned_process_sees_its_code() {
    let code = vec![0x55, 0x89, 0xe5, 0xc3];
    let mut kernel = test_bootstrap();
    kernel.add_program("/c/tiny.exe", program_with_code(0x4000, code.clone()));

    let pid = kernel.spawn("/c/tiny.exe", "tiny").unwrap();
    let ctx = kernel.thread(pid).and_then(|t| t.user_context()).unwrap();
    let space = kernel.loader().spaces().space(ctx.address_space()).unwrap();

    assert_eq!(ctx.entry_address(), 0x4000);
    assert_eq!(space.read(0x4000, 4), Some(&code[..]));
    assert_eq!(space.read(ctx.argument_block(), 5), Some(&b"tiny\0"[..]));
}

#[test]
fn test_parsed_segments_stay_inside_image() {
    let images = vec![
        two_segment_program(),
        program_with_code(0x8000, vec![0xcc; 300]),
        ElfImageBuilder::new(0x1000)
            .segment(0x40, 0, 0x5000, 0x2000, SegmentFlags::rw())
            .segment(0x40, 0x80, 0x1000, 0x80, SegmentFlags::rx())
            .build(),
        ElfImageBuilder::new(0x1000)
            .program_header_offset(0x34)
            .segment(0x100, 0x200, 0x1000, 0x1000, SegmentFlags::rx())
            .build(),
    ];

    for image in images {
        let layout = parse_executable(&image).unwrap();
        let mut loaded = Vec::new();
        for segment in layout.segments() {
            let range = segment.file_range();
            assert!(range.end <= image.len() as u64);
            assert!(segment.length_in_file <= segment.size_in_memory);
            loaded.push(&image[range.start as usize..range.end as usize]);
        }
        assert_eq!(loaded.len(), layout.len());
    }
}
