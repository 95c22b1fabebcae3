mod cli;

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser as _;
use nu_syntax::diagnostics::DiagnosticPrinter;
use nu_syntax::lexer::{self, Lexeme};
use nu_syntax::limits::ParserLimits;
use nu_syntax::parser::parse_with_limits;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let limits = match &cli.config {
        Some(path) => ParserLimits::from_toml_file(path)?,
        None => ParserLimits::default(),
    };

    match cli.command {
        Commands::Parse(args) => {
            let source = read_source(&args.file)?;
            let ast = parse_with_limits(&source, &limits)?;
            if args.json {
                println!("{}", ast.to_json()?);
            } else if args.spans {
                print!("{:#}", ast);
            } else {
                print!("{}", ast);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tokens(args) => {
            let source = read_source(&args.file)?;
            for lexeme in lexer::lex(&source, &limits)? {
                if let Lexeme::Token(token) = lexeme {
                    println!(
                        "{:>6}..{:<6} {:?} {:?}",
                        token.span.start,
                        token.span.end,
                        token.kind,
                        token.text(&source)
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check(args) => {
            let source = read_source(&args.file)?;
            let ast = parse_with_limits(&source, &limits)?;

            let printer = DiagnosticPrinter::new(args.file.display().to_string(), &source);
            if !ast.diagnostics.is_empty() {
                eprintln!("{}", printer.render_all(&ast.diagnostics));
            }

            if ast.has_errors() {
                Ok(ExitCode::from(1))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

fn read_source(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e).into())
}
