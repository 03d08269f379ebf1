// taint driver: run context-sensitive points-to with the taint plugin and
// print the detected source-to-sink flows.

use clap::Parser;

use javelin::front_end::load;
use javelin::middle_end::pta::{cs, selector};
use javelin::middle_end::taint::{TaintConfig, TaintPlugin};

// Command-line arguments
#[derive(Parser)]
#[command(version, about)]
struct Args {
    input_file: String,
    /// taint configuration (sources, sinks, transfers)
    #[arg(long = "taint-config")]
    config: String,
    /// context-sensitivity variant: ci | 1-call | 2-call | 1-obj | 2-obj | 2-type
    #[arg(long, default_value = "2-call")]
    cs: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let read = |input_file: &str| {
        String::from_utf8(
            std::fs::read(input_file)
                .unwrap_or_else(|_| panic!("Could not read the input file {input_file}")),
        )
        .expect("The input file does not contain valid utf-8 text")
    };

    let program = load(&read(&args.input_file)).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    });
    let config: TaintConfig = read(&args.config).parse().unwrap_or_else(|e| {
        eprintln!("bad taint config: {e}");
        std::process::exit(1);
    });
    let selector = selector::by_name(&args.cs).unwrap_or_else(|| {
        eprintln!("unknown context-sensitivity variant: {}", args.cs);
        std::process::exit(1);
    });
    let entry = program.0.main_method().unwrap_or_else(|| {
        eprintln!("the program has no `static method main()` entry");
        std::process::exit(1);
    });

    let plugin = TaintPlugin::new(&program.0, &config);
    let result = cs::analyze(&program, entry, selector, Some(plugin));

    if result.taint_flows.is_empty() {
        println!("no taint flows");
    } else {
        for flow in &result.taint_flows {
            println!("{flow}");
        }
    }
}
