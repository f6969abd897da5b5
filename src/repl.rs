use crate::engine::Engine;
use std::io::{self, Write};

/// Interactive shell loop. The engine persists between lines, so macros,
/// variables, and background tasks survive across commands; due background
/// tasks are pumped between lines, never mid-statement.

pub fn start() {
    println!("bitsh v0.1.0");
    println!("Type 'help' for help, 'exit' or Ctrl+C to quit");
    println!();

    let mut engine = Engine::new();

    loop {
        engine.pump_background();

        print!("> ");
        io::stdout().flush().unwrap();

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // EOF reached (Ctrl+D or piped input ended)
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    println!("Goodbye!");
                    break;
                }

                // Echo the value of a bare expression line; statements and
                // assignments stay silent.
                let echo = engine.is_bare_expression(line);
                match engine.eval(line) {
                    Ok(value) => {
                        if echo {
                            println!("{}", value);
                        }
                    }
                    Err(error) => error.report(line, None),
                }
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}
