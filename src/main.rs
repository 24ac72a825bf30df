use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::Shell;
use gridc::ir::{FnBody, Program};
use gridc::parser::Parser;
use gridc::typechecker::{CheckerOptions, TypeChecker};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(ClapParser)]
#[command(name = "gridc", version, about = "Static checker for grid stack programs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Type-check a .gir listing
    Check {
        /// Path to the .gir listing
        file: PathBuf,
        /// Print every step of the symbolic stack machine
        #[arg(long)]
        trace: bool,
        /// Print the parsed instructions before checking
        #[arg(long)]
        ir: bool,
        /// How deep subroutine applications are followed
        #[arg(long, default_value_t = CheckerOptions::default().max_apply_depth)]
        max_apply_depth: usize,
    },
    /// Print the signatures declared by a .gir listing
    Signatures {
        /// Path to the .gir listing
        file: PathBuf,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check {
            file,
            trace,
            ir,
            max_apply_depth,
        } => {
            let program = load(&file)?;
            if ir {
                print_ir(&program);
            }

            let mut checker = TypeChecker::with_options(CheckerOptions {
                trace,
                max_apply_depth,
            });
            let result = checker.check_program(&program);
            for line in checker.trace() {
                println!("{}", line);
            }

            if let Err(e) = result {
                match e.span {
                    Some(span) => eprintln!("{}:{}: {}", file.display(), span, e),
                    None => eprintln!("{}: {}", file.display(), e),
                }
                std::process::exit(1);
            }
            println!("ok");
        }

        Command::Signatures { file } => {
            let program = load(&file)?;
            let mut checker = TypeChecker::new();
            let table = match checker.signatures(&program) {
                Ok(table) => table,
                Err(e) => {
                    eprintln!("{}: {}", file.display(), e);
                    std::process::exit(1);
                }
            };
            for (name, effect) in table.declared() {
                println!("{} :: {}", name, effect);
            }
        }

        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "gridc", &mut io::stdout());
        }
    }

    Ok(())
}

fn load(file: &Path) -> Result<Program, Box<dyn std::error::Error>> {
    let source = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;

    let mut parser = Parser::new(&source);
    match parser.parse() {
        Ok(program) => Ok(program),
        Err(e) => {
            eprintln!("{}:{}:{}: {}", file.display(), e.line, e.column, e.message);
            std::process::exit(1);
        }
    }
}

fn print_ir(program: &Program) {
    for decl in &program.fn_decls {
        match &decl.body {
            FnBody::Native(body) => {
                println!("{}:", decl.name);
                for (i, instr) in body.iter().enumerate() {
                    println!("  {:>4}  {}", i, instr);
                }
            }
            FnBody::Foreign => println!("{}: extern", decl.name),
        }
    }
}
