use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use sexpeval::ast::Value;
use sexpeval::evaluator::{self, Environment};
use sexpeval::reader::{Balance, ParseConfig, balance_with_config, parse_with_config};
use std::thread;
use std::process;
use tracing_subscriber::EnvFilter;

const HISTORY_FILE: &str = ".sexpeval_history";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

const CONFIG: ParseConfig = ParseConfig {
    handle_comments: true,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Evaluation recurses on the host stack, so give it room for the full depth limit
    let repl_thread = thread::Builder::new()
        .name("repl".to_owned())
        .stack_size(sexpeval::EVAL_STACK_SIZE)
        .spawn(run_repl);
    let result = match repl_thread {
        Ok(handle) => handle.join(),
        Err(err) => {
            eprintln!("Could not start the REPL thread: {err}");
            process::exit(1);
        }
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            eprintln!("Could not run the REPL: {err}");
            process::exit(1);
        }
        Err(panic_info) => {
            eprintln!("The REPL encountered an unexpected error and must exit.");

            if let Some(msg) = panic_info.downcast_ref::<&str>() {
                eprintln!("Error: {msg}");
            } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                eprintln!("Error: {msg}");
            } else {
                eprintln!("Error: Unknown panic occurred");
            }

            process::exit(1);
        }
    }
}

fn run_repl() -> Result<(), ReadlineError> {
    println!("sexpeval: a small S-expression interpreter");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;
    if let Err(err) = rl.load_history(HISTORY_FILE) {
        tracing::debug!(%err, "no history loaded");
    }
    let env = evaluator::create_global_env();

    let mut count: usize = 1;
    let mut pending: Vec<String> = Vec::new();
    let mut indent: usize = 0;

    loop {
        let prompt = if pending.is_empty() {
            format!("{RED}[{count}]{RESET} > ")
        } else {
            format!("...   {}", "  ".repeat(indent))
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                if pending.is_empty() {
                    match line.trim() {
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(&env);
                            continue;
                        }
                        ":quit" | ":exit" => break,
                        _ => {}
                    }
                }

                pending.push(line);
                let source = pending.join("\n");
                if let Balance::Open { depth } = balance_with_config(&source, CONFIG) {
                    indent = depth;
                    continue;
                }

                pending.clear();
                indent = 0;
                if let Err(err) = rl.add_history_entry(source.as_str()) {
                    tracing::debug!(%err, "history entry not recorded");
                }

                match parse_with_config(&source, CONFIG).and_then(|expr| evaluator::eval(&expr, &env)) {
                    Ok(result) => {
                        println!("{GREEN}[{count}]{RESET} {result}");
                        println!();
                        count += 1;
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }

            // Ctrl-C abandons a partly typed expression
            Err(ReadlineError::Interrupted) => {
                println!("KeyboardInterrupt");
                pending.clear();
                indent = 0;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    println!();
    rl.save_history(HISTORY_FILE)
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Discard the expression being entered");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Input spanning several lines is collected until its parentheses balance.");
    println!("Comments start with ';' and run to the end of the line.");
    println!();
    println!("Special forms:");
    println!("  quote lambda define set if cond and or let map seq gethash");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (define square (lambda (x) (* x x)))");
    println!("  (map square '(1 2 3))");
    println!("  (let ((x 22) (y 11)) (* x y))");
    println!("  (define h (make-hash-table))");
    println!("  (set (gethash 'k h) 42)");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in functions from everything else
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::BuiltinFunction { .. } => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("Other bindings ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
