#![no_main]

use libfuzzer_sys::fuzz_target;
use tabula_xlsx::sax::SaxReader;
use tabula_xlsx::xform::parse_part;
use tabula_xlsx::xform::sheet::WorksheetXform;

/// Worksheet parts in the wild are large, but the token paths are exercised by small inputs.
const MAX_INPUT_BYTES: usize = 256 * 1024;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];

    // Raw token stream: must terminate with an event, `None`, or an error.
    let mut sax = SaxReader::new(data, "fuzz.xml");
    while let Ok(Some(_)) = sax.next_event() {}

    // The same bytes as a worksheet, with limits so hostile row counts stay bounded.
    let mut xform = WorksheetXform::new(Some(10_000), Some(1_000));
    let _ = parse_part(&mut xform, data, "xl/worksheets/sheet1.xml");
});
