#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(doc) = fattura::fatturapa::decode_document(data) {
        // Whatever was decoded must be valid UTF-8 without stray controls.
        assert!(!doc.xml.contains('\0'));
    }
});
