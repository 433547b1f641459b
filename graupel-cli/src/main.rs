use anyhow::Result;
use graupel_core::toolchain;
use std::{env, path::Path};

fn run(input: &str, output: &str) -> Result<()> {
    let code = toolchain::translate_file(input)?;
    std::fs::write(output, code)?;
    Ok(())
}

fn watch(input: &str, output: &str) -> Result<()> {
    use std::time::Duration;

    let path = Path::new(input);
    let mut last_modified = path.metadata()?.modified()?;

    loop {
        let metadata = path.metadata()?;
        if metadata.modified()? != last_modified {
            last_modified = metadata.modified()?;
            let time = std::time::SystemTime::now();
            match run(input, output) {
                Err(e) => {
                    eprintln!("{e}");
                }
                _ => println!("Compiled successfully in {}ms", time.elapsed()?.as_millis()),
            }
        }

        std::thread::sleep(Duration::from_secs(1));
    }
}

fn usage() {
    println!("Usage: graupel <input.sbl> <output> [--watch]");
    println!();
    println!("Translates a Snowball stemming program into a Python module.");
    println!();
    println!("  --watch   recompile whenever the input file changes");
    println!("  --help    print this message");
}

fn main() {
    let args: Vec<_> = env::args().collect();

    if args.iter().any(|a| a == "--help") {
        usage();
        return;
    }
    let files: Vec<_> = args[1..].iter().filter(|a| !a.starts_with("--")).collect();
    if files.len() != 2 {
        usage();
        std::process::exit(2);
    }
    let (input, output) = (files[0].as_str(), files[1].as_str());

    if let Err(e) = run(input, output) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if args.iter().any(|a| a == "--watch") {
        println!("Watching for changes... Press Ctrl+C to stop.");
        if let Err(e) = watch(input, output) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
