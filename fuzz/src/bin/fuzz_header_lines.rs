//! Fuzz the header-line grammar and structured-option parser using the input as raw header
//! bytes wrapped in a minimal one-segment envelope.
#[macro_use]
extern crate afl;

fn main() {
    fuzz!(|data: &[u8]| {
        multipart_stream::fuzzing::fuzz_header_lines(data);
    })
}
