use std::fs;
use std::path::PathBuf;

use x64asm::asm;

pub static TESTS_DIR: &str = "tests/files";

// Include the programmatically generated test file.
include!(concat!(env!("OUT_DIR"), "/source_tests.rs"));

/// Run a specific test by loading the reference source file and
/// assembling it.  All reference sources should assemble clean.
fn check(test: &str) {
    // Construct input file
    let srcfile = to_srcfile(test);
    // Read the test file
    let input = fs::read_to_string(srcfile).unwrap();
    // Assemble it
    let (program, errors) = asm::assemble(&input);
    // Check nothing was flagged
    if !errors.is_empty() {
        panic!("errors assembling {test}: {errors:?}");
    }
    // Sanity check something came out of it
    let empty = program.code().is_empty()
        && program.data().is_empty()
        && program.drivers().is_empty();
    assert!(!empty, "nothing assembled for {test}");
}

fn to_srcfile(test: &str) -> PathBuf {
    let mut path = PathBuf::from(TESTS_DIR);
    path.push(test.to_string());
    path.set_extension("s");
    path
}
