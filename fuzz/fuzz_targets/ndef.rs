#![no_main]

use isomdl_proximity::nfc::carrier::CarrierRegistry;
use isomdl_proximity::nfc::handover;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let registry = CarrierRegistry::default();
    let _ = handover::parse_handover_select(data, &registry);
    let _ = handover::parse_handover_request(data, &registry);
});
