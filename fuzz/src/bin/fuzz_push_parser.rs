//! Fuzz the push parser's main loop over arbitrary, arbitrarily-chunked input.
#[macro_use]
extern crate afl;

fn main() {
    fuzz!(|data: &[u8]| {
        multipart_stream::fuzzing::fuzz_push_parser(data);
    })
}
