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

use clap::{arg, Arg, Command};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
//
use evmsym::cfg::Cfg;
use evmsym::disasm::Parser;
use evmsym::explorer::Explorer;
use evmsym::solver::SmtSolver;

fn main() -> Result<(), Box<dyn Error>> {
    // Parse command-line arguments
    let matches = Command::new("evmsym")
        .about("Symbolic execution over EVM disassemblies")
        .version("0.1.0")
        .arg(arg!(--verbose "Show verbose output"))
        .arg(
            Arg::new("limit")
                .long("limit")
                .takes_value(true)
                .help("Bound the number of blocks visited along any one path"),
        )
        .arg(Arg::new("file").required(true))
        .get_matches();
    // Extract top-level flags
    let verbose = matches.is_present("verbose");
    // Initialise logging
    if verbose {
        init_logging(LevelFilter::Debug);
    } else {
        init_logging(LevelFilter::Info);
    }
    let limit = match matches.get_one::<String>("limit") {
        Some(text) => Some(text.parse::<usize>()?),
        None => None,
    };
    // Extract the file to be explored.
    let filename = matches.get_one::<String>("file").unwrap();
    // Read the disassembly
    let input = fs::read_to_string(filename)?;
    // Partition it into blocks
    let disasm = Parser::new(&input).parse()?;
    // Materialise the graph and its static edges
    let mut cfg = Cfg::from_disassembly(&disasm);
    cfg.add_falls_to();
    // Explore every feasible path
    let z3 = z3::Context::new(&z3::Config::new());
    let mut solver = SmtSolver::new(&z3);
    let mut explorer = Explorer::new(&mut cfg, &mut solver).with_limit(limit);
    explorer.explore()?;
    let paths = explorer.closed_paths().len();
    let unresolved = explorer.unresolved_jumps();
    // Report the graph as it stands after exploration
    for block in cfg.vertices.values() {
        print!("{block}");
    }
    println!("edges: {:?}", cfg.edges);
    println!("paths closed: {paths}");
    if unresolved > 0 {
        println!("unresolved jumps: {unresolved}");
    }
    //
    Ok(())
}

/// Initialise logging using a suitable pattern.
fn init_logging(level: LevelFilter) {
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
