// analysis driver: run one analysis pass over a program and print (or
// write) its results.

use std::io::{BufWriter, Write};
use std::str::FromStr;

use clap::Parser;

use javelin::commons::Valid;
use javelin::front_end::load;
use javelin::middle_end::analysis::{constprop, deadcode, liveness, Cfg};
use javelin::middle_end::callgraph;
use javelin::middle_end::inter;
use javelin::middle_end::lang::{MethodRef, Program};
use javelin::middle_end::pta::{ci, cs, selector};

#[derive(Clone, Copy)]
struct Pass(fn(&Args, &Valid<Program>) -> String);

impl FromStr for Pass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pass = match s {
            "constprop" => Pass(constprop_pass),
            "liveness" => Pass(liveness_pass),
            "deadcode" => Pass(deadcode_pass),
            "cha" => Pass(cha_pass),
            "pta" => Pass(pta_pass),
            "inter-constprop" => Pass(inter_constprop_pass),
            _ => return Err(format!("unknown analysis pass: {s}")),
        };
        Ok(pass)
    }
}

// Command-line arguments
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// constprop | liveness | deadcode | cha | pta | inter-constprop
    analysis: Pass,
    input_file: String,
    /// print to stdout when omitted
    output_file: Option<String>,
    /// points-to variant for pta and inter-constprop:
    /// ci | 1-call | 2-call | 1-obj | 2-obj | 2-type
    #[arg(long, default_value = "ci")]
    pta: String,
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

    let output = args.analysis.0(&args, &program);

    match &args.output_file {
        Some(path) => std::fs::write(path, output)
            .unwrap_or_else(|_| panic!("Failed to write the results to {path}")),
        None => print!("{output}"),
    }
}

fn entry_of(program: &Valid<Program>) -> MethodRef {
    program.0.main_method().unwrap_or_else(|| {
        eprintln!("the program has no `static method main()` entry");
        std::process::exit(1);
    })
}

fn points_to(args: &Args, program: &Valid<Program>) -> javelin::middle_end::pta::result::PointerAnalysisResult {
    let entry = entry_of(program);
    if args.pta == "ci" {
        return ci::analyze(program, entry);
    }
    let selector = selector::by_name(&args.pta).unwrap_or_else(|| {
        eprintln!("unknown points-to variant: {}", args.pta);
        std::process::exit(1);
    });
    cs::analyze(program, entry, selector, None)
}

// per-method exit facts of the intraprocedural constant propagation.
fn constprop_pass(_args: &Args, program: &Valid<Program>) -> String {
    let mut w = BufWriter::new(Vec::new());
    for method in program.0.methods_with_ir() {
        let result = constprop::analyze(program, &method);
        let cfg = Cfg::new(program.0.ir(&method).unwrap());
        write!(w, "{method}:\n\n{}\n", result.in_fact(cfg.exit)).unwrap();
    }
    String::from_utf8(w.into_inner().unwrap()).unwrap()
}

// live variables after every statement.
fn liveness_pass(_args: &Args, program: &Valid<Program>) -> String {
    let mut w = BufWriter::new(Vec::new());
    for method in program.0.methods_with_ir() {
        let result = liveness::analyze(program, &method);
        let ir = program.0.ir(&method).unwrap();
        let cfg = Cfg::new(ir);
        writeln!(w, "{method}:").unwrap();
        for stmt in &ir.stmts {
            let live = result.out_fact(cfg.node_of(stmt.index));
            let names: Vec<&str> = live.iter().map(|v| v.name()).collect();
            writeln!(w, "{}: {{{}}}", stmt.index, names.join(", ")).unwrap();
        }
        writeln!(w).unwrap();
    }
    String::from_utf8(w.into_inner().unwrap()).unwrap()
}

fn deadcode_pass(_args: &Args, program: &Valid<Program>) -> String {
    let mut w = BufWriter::new(Vec::new());
    for method in program.0.methods_with_ir() {
        let dead = deadcode::analyze(program, &method);
        if dead.is_empty() {
            continue;
        }
        let ir = program.0.ir(&method).unwrap();
        writeln!(w, "{method}:").unwrap();
        for i in dead {
            writeln!(w, "{}: {}", i, ir.stmts[i]).unwrap();
        }
        writeln!(w).unwrap();
    }
    String::from_utf8(w.into_inner().unwrap()).unwrap()
}

fn cha_pass(_args: &Args, program: &Valid<Program>) -> String {
    let entry = entry_of(program);
    callgraph::build_cha(program, entry).to_string()
}

// points-to sets of every variable the analysis saw.
fn pta_pass(args: &Args, program: &Valid<Program>) -> String {
    let result = points_to(args, program);
    let mut w = BufWriter::new(Vec::new());
    for var in result.vars() {
        writeln!(w, "{}/{} -> {}", var.method(), var, result.points_to(var)).unwrap();
    }
    String::from_utf8(w.into_inner().unwrap()).unwrap()
}

// per-method exit facts of the interprocedural constant propagation.
fn inter_constprop_pass(args: &Args, program: &Valid<Program>) -> String {
    let pta = points_to(args, program);
    let result = inter::analyze(program, &pta);
    let mut w = BufWriter::new(Vec::new());
    let mut methods: Vec<&MethodRef> = result.icfg.cfgs.keys().collect();
    methods.sort();
    for method in methods {
        write!(w, "{method}:\n\n{}\n", result.exit_fact(method)).unwrap();
    }
    String::from_utf8(w.into_inner().unwrap()).unwrap()
}
