#![no_main]

use libfuzzer_sys::fuzz_target;
use tabula_xlsx::{read_workbook_from_bytes, PackageLimits, ReadOptions};

fuzz_target!(|data: &[u8]| {
    // Tight limits keep zip bombs from dominating a run.
    let options = ReadOptions {
        max_rows: Some(10_000),
        max_cols: Some(1_000),
        limits: PackageLimits {
            max_part_bytes: 8 * 1024 * 1024,
            max_total_bytes: 32 * 1024 * 1024,
        },
    };
    let _ = read_workbook_from_bytes(data, &options);
});
