#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = fattura::fatturapa::parse_source(data, "fuzz.xml.p7m", &fattura::fatturapa::ScanOpener);
});
