/**
 * Copyright 2022 - Jahred Love
 *
 * Redistribution and use in source and binary forms, with or without modification,
 * are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 * list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice, this
 * list of conditions and the following disclaimer in the documentation and/or other
 * materials provided with the distribution.
 *
 * 3. Neither the name of the copyright holder nor the names of its contributors may
 * be used to endorse or promote products derived from this software without specific
 * prior written permission.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS “AS IS” AND
 * ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED
 * WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED.
 * IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT,
 * INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT
 * NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
 * PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
 * WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE)
 * ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE
 * POSSIBILITY OF SUCH DAMAGE.
 */

use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod compile;
mod error;
mod format;
mod interp;
mod ir;
mod loops;
mod print;
mod runtime;
mod source;
mod tape;
mod translate;
mod verify;

#[cfg(test)]
mod tests;

const EXIT_IO: i32 = 1;
const EXIT_SYNTAX: i32 = 2;
const EXIT_RUN: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "cellc")]
#[command(about = "Compile tape-language programs to an SSA graph over a linked, lazily grown tape")]
struct Cli {
    /// Input file ("-" reads standard input)
    #[arg(default_value = "-")]
    input: String,

    /// Output file ("-" writes standard output)
    #[arg(short = 'o', value_name = "filename", default_value = "-")]
    output: String,

    /// Write the textual listing instead of the binary container
    #[arg(short = 'S')]
    human_readable: bool,

    /// Write the binary container even when standard output is a terminal
    #[arg(short = 'f')]
    force: bool,

    /// Run the program on standard input/output instead of writing it
    #[arg(long)]
    run: bool,

    /// Stop a run after this many executed instructions
    #[arg(long, value_name = "N")]
    max_steps: Option<u64>,
}

fn fail(code: i32, msg: impl std::fmt::Display) -> ! {
    eprintln!("{}", msg);
    std::process::exit(code);
}

fn read_input(input: &str) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if input == "-" {
        io::stdin().lock().read_to_end(&mut bytes)?;
    } else {
        std::fs::File::open(PathBuf::from(input))?.read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

/// Load a previously written container instead of compiling text.
fn load_container(bytes: &[u8], input_name: &str) -> ir::IrModule {
    let module = format::read_module(&mut &bytes[..])
        .unwrap_or_else(|e| fail(EXIT_IO, format!("error: failed to read {}: {}", input_name, e)));
    if let Err(e) = verify::verify_module(&module) {
        fail(EXIT_SYNTAX, format!("{}: {}", input_name, e.render(bytes, None)));
    }
    module
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "cellc=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let input_name = if cli.input == "-" { "<stdin>" } else { cli.input.as_str() };

    let src = read_input(&cli.input)
        .unwrap_or_else(|e| fail(EXIT_IO, format!("Error opening input file: {}: {}", input_name, e)));

    let module = if format::is_container(&src) {
        info!(input = input_name, bytes = src.len(), "loading container");
        load_container(&src, input_name)
    } else {
        // Program text is fed byte by byte; the first error ends compilation.
        info!(input = input_name, bytes = src.len(), "compiling");
        compile::compile_bytes(&src).unwrap_or_else(|e| fail(EXIT_SYNTAX, e.render(&src, Some(input_name))))
    };
    let entry_name = compile::ENTRY_NAME;

    if cli.run {
        let config = interp::Config { fuel: cli.max_steps };
        let stdout = io::stdout();
        let mut vm = interp::Machine::new(&module, io::stdin().lock(), BufWriter::new(stdout.lock()), config);
        if let Err(e) = vm.run(entry_name) {
            fail(EXIT_RUN, format!("error: {}", e));
        }
        info!(steps = vm.steps(), cells = vm.heap().len(), "run finished");
        return;
    }

    let to_stdout = cli.output == "-";
    if !cli.human_readable && !cli.force && to_stdout && io::stdout().is_terminal() {
        fail(
            EXIT_IO,
            "WARNING: refusing to write a binary container to a terminal; use -S for a listing or -f to force",
        );
    }

    let mut out: Box<dyn Write> = if to_stdout {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else {
        let file = std::fs::File::create(&cli.output)
            .unwrap_or_else(|e| fail(EXIT_IO, format!("error: failed to create {}: {}", cli.output, e)));
        Box::new(BufWriter::new(file))
    };

    let written = if cli.human_readable {
        write!(out, "{}", module)
    } else {
        format::write_module(&module, &mut out)
    };
    if let Err(e) = written.and_then(|_| out.flush()) {
        fail(EXIT_IO, format!("error: failed to write {}: {}", cli.output, e));
    }
    info!(output = %cli.output, human_readable = cli.human_readable, "module written");
}
