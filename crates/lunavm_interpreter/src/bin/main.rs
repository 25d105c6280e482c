use lunavm::{LuaState, LuaValue};
use std::env;
use std::fs;

const VERSION: &str = "lunavm 0.3 (Lua 5.1 bytecode)";

fn print_usage() {
    eprintln!("usage: lunavm [options] chunk.luac");
    eprintln!("Available options are:");
    eprintln!("  -v        show version information");
    eprintln!("  --        stop handling options");
}

#[derive(Default)]
struct Options {
    show_version: bool,
    chunk_file: Option<String>,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::default();
    let mut stop_options = false;

    for arg in &args[1..] {
        if !stop_options && arg.starts_with('-') {
            match arg.as_str() {
                "-v" => opts.show_version = true,
                "--" => stop_options = true,
                _ => return Err(format!("unrecognized option '{}'", arg)),
            }
        } else if opts.chunk_file.is_none() {
            opts.chunk_file = Some(arg.clone());
        } else {
            return Err(format!("unexpected argument '{}'", arg));
        }
    }

    Ok(opts)
}

fn run_file(filename: &str) -> Result<Vec<LuaValue>, String> {
    let data = fs::read(filename).map_err(|e| format!("cannot open {}: {}", filename, e))?;
    let proto = lunavm::load(&data).map_err(|e| format!("{}: {}", filename, e))?;

    let mut state = LuaState::new();
    state.open_libs();
    state.execute_chunk(proto).map_err(|e| e.to_string())
}

fn main() {
    pretty_env_logger::init();

    // Nested protected calls and metamethod dispatch re-enter the
    // interpreter on the host stack; run it on a thread with room.
    let stack_size = 16 * 1024 * 1024;
    let builder = std::thread::Builder::new()
        .name("lunavm-main".into())
        .stack_size(stack_size);

    let handle = builder.spawn(lua_main).expect("failed to spawn VM thread");
    match handle.join() {
        Ok(code) => std::process::exit(code),
        Err(_) => {
            eprintln!("lunavm: internal error (VM thread panicked)");
            std::process::exit(1);
        }
    }
}

fn lua_main() -> i32 {
    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("lunavm: {}", e);
            print_usage();
            return 1;
        }
    };

    if opts.show_version {
        println!("{}", VERSION);
        if opts.chunk_file.is_none() {
            return 0;
        }
    }

    let Some(filename) = &opts.chunk_file else {
        print_usage();
        return 1;
    };

    match run_file(filename) {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("lunavm: {}", e);
            1
        }
    }
}
