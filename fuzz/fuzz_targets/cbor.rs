#![no_main]

use isomdl_proximity::cbor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(item) = cbor::decode(data) {
        let _ = item.to_diagnostics(Default::default());
        let _ = cbor::encode(&item);
    }
});
