mod common;

use std::io::{self, Write};

use common::Hack;
use vmtrans::error::TranslateError;
use vmtrans::parser::parse;
use vmtrans::translator::{Translator, TranslatorConfig};
use vmtrans::{translate_files, VmFile};

const MAIN_VM: &str = "\
// Main.vm
function Main.main 0
    push constant 3
    call Counter.bump 1
    push constant 4
    call Counter.bump 1
    add
    return
";

const COUNTER_VM: &str = "\
// Counter.vm: adds its argument to a running total
function Counter.bump 0
    push static 0
    push argument 0
    add
    pop static 0
    push static 0
    return
";

const SYS_VM: &str = "\
function Sys.init 0
    call Main.main 0
    pop temp 0
label HALT
    goto HALT
";

fn file(stem: &str, source: &str) -> VmFile {
    VmFile {
        stem: stem.to_string(),
        commands: parse(source).unwrap(),
    }
}

#[test]
fn program_from_several_files() {
    let lines = translate_files(
        &[
            file("Counter", COUNTER_VM),
            file("Main", MAIN_VM),
            file("Sys", SYS_VM),
        ],
        TranslatorConfig {
            init_function: Some("Sys.init".to_string()),
            ..TranslatorConfig::default()
        },
    )
    .unwrap();

    let mut hack = Hack::assemble(&lines);
    hack.run_until("Sys.init$HALT");
    assert_eq!(hack.symbol_value("Counter.0"), 7);
    assert_eq!(hack.ram[5], 3 + 7);
    assert_eq!(hack.sp(), 256 + 5);
}

#[test]
fn error_index_spans_files() {
    let err = translate_files(
        &[
            file("Counter", COUNTER_VM),
            VmFile {
                stem: "Bad".to_string(),
                commands: parse("push constant 1\npush pointer 2").unwrap(),
            },
        ],
        TranslatorConfig::default(),
    )
    .unwrap_err();

    match err {
        TranslateError::MalformedCommand { index, command, .. } => {
            assert_eq!(index, 8);
            assert_eq!(command, "push pointer 2");
        }
        other => panic!("unexpected error {}", other),
    }
}

#[test]
fn pop_constant_is_rejected() {
    let err = translate_files(
        &[file("Main", "push constant 1\npop constant 0")],
        TranslatorConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranslateError::ProtocolPrecondition { index: 1, .. }
    ));
}

struct Broken;

impl Write for Broken {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn sink_failure_is_reported() {
    let translator = Translator::new(TranslatorConfig::default());
    let err = translator.write_to(Broken).unwrap_err();
    assert!(matches!(err, TranslateError::Sink(_)));
}
