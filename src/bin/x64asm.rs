// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use std::error::Error;
use std::fs;

use clap::{arg, Arg, ArgMatches, Command};
use log::{info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
//
use x64asm::asm;
use x64asm::asm::Program;

fn main() -> Result<(), Box<dyn Error>> {
    // Parse command-line arguments
    let matches = Command::new("x64asm")
        .about("x64asm Tool")
        .version("0.1.0")
        .subcommand_required(true)
        .arg(arg!(--verbose "Show verbose output"))
        .subcommand(
            Command::new("assemble")
                .about("Assemble a source file and dump the resulting program")
                .arg(Arg::new("file").required(true))
                .visible_alias("a"),
        )
        .subcommand(
            Command::new("check")
                .about("Parse a source file and report its diagnostics")
                .arg(Arg::new("file").required(true))
                .visible_alias("c"),
        )
        .get_matches();
    // Extract top-level flags
    let verbose = matches.is_present("verbose");
    // Initialise logging
    if verbose {
        init_logging(LevelFilter::Debug);
    }
    // Dispatch on outcome
    let ok = match matches.subcommand() {
        Some(("assemble", args)) => assemble(args, true),
        Some(("check", args)) => assemble(args, false),
        _ => unreachable!(),
    }?;
    // Determine appropriate exit code
    let exitcode = i32::from(!ok);
    // Done
    std::process::exit(exitcode);
}

/// Assemble a given file, optionally dumping the program that came
/// out of it.
fn assemble(args: &ArgMatches, dump_program: bool) -> Result<bool, Box<dyn Error>> {
    // Extract the file to be assembled.
    let filename = args.get_one::<String>("file").unwrap();
    // Read the source file
    let input = fs::read_to_string(filename)?;
    // Assemble it, keeping whatever was understood
    let (program, errors) = asm::assemble(&input);
    // Report diagnostics with their source positions
    for e in &errors {
        eprintln!("{filename}:{e}");
    }
    info!("{} diagnostics for {}", errors.len(), filename);
    //
    if dump_program {
        dump(&program);
    }
    Ok(errors.is_empty())
}

/// Render the program the way the simulator will see it.
fn dump(program: &Program) {
    // Symbols, in address order
    let mut symbols: Vec<_> = program.symbols().iter().collect();
    symbols.sort_by_key(|(name, addr)| (**addr, (*name).clone()));
    for (name, addr) in symbols {
        println!("{name} = {addr:#x}");
    }
    // Data image extent
    if !program.data().is_empty() {
        println!("data: {} bytes", program.data().len());
    }
    // Code listing
    for (i, insn) in program.code().iter().enumerate() {
        println!("{i:4}: {insn}");
    }
    // Drivers, in key order
    let mut drivers: Vec<_> = program.drivers().iter().collect();
    drivers.sort_by_key(|(key, _)| key.to_string());
    for (key, body) in drivers {
        println!("driver {key}:");
        for insn in body {
            println!("      {insn}");
        }
    }
}

/// Initialise logging using a suitable pattern.
pub fn init_logging(level: LevelFilter) {
    let encoder = PatternEncoder::new("[{l}] {m}{n}");
    //
    let stdout = ConsoleAppender::builder().encoder(Box::new(encoder)).build();
    //
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .unwrap();
    //
    let _handle = log4rs::init_config(config).unwrap();
}
