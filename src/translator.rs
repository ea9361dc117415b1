use std::io::Write;

use log::{debug, trace, warn};

use crate::ast::{ArithmeticOp::*, Command::*, Segment::*, *};
use crate::error::{TranslateError, Violation};

macro_rules! svec {
    ($($x:expr),* $(,)?) => (vec![$($x.to_string()),*]);
}

/// Largest value an A-instruction can load.
pub const MAX_IMMEDIATE: u16 = 0x7FFF;

/// First RAM word of the temp segment (`R5`..`R12`).
pub const TEMP_BASE: u16 = 5;
pub const TEMP_SIZE: u16 = 8;

/// Words pushed by a caller between its arguments and the callee's locals:
/// the return address and the four saved base pointers.
pub const FRAME_SIZE: u16 = 5;

// Offsets below the callee's LCL at which the call protocol stores caller state.
pub const RETURN_ADDRESS_OFFSET: u16 = 5;
pub const SAVED_LCL: u16 = 4;
pub const SAVED_ARG: u16 = 3;
pub const SAVED_THIS: u16 = 2;
pub const SAVED_THAT: u16 = 1;

/// Saved caller registers in push order, with their offset below the frame base.
const SAVED_STATE: [(&str, u16); 4] = [
    ("LCL", SAVED_LCL),
    ("ARG", SAVED_ARG),
    ("THIS", SAVED_THIS),
    ("THAT", SAVED_THAT),
];

// Scratch registers.
const ADDRESS: &str = "R13";
const FRAME: &str = "R13";
const RETURN_ADDRESS: &str = "R14";

fn at<T: std::fmt::Display>(arg: T) -> String {
    format!("@{}", arg)
}

fn marker(label: &str) -> String {
    format!("({})", label)
}

fn immediate(value: u16, what: &str) -> Result<u16, Violation> {
    if value > MAX_IMMEDIATE {
        return Err(Violation::Malformed(format!(
            "{} {} does not fit an immediate (max {})",
            what, value, MAX_IMMEDIATE
        )));
    }
    Ok(value)
}

fn pointer_arg(arg: u16) -> Result<&'static str, Violation> {
    match arg {
        0 => Ok("THIS"),
        1 => Ok("THAT"),
        _ => Err(Violation::Malformed(format!(
            "pointer index {} is not 0 or 1",
            arg
        ))),
    }
}

fn temp_arg(arg: u16) -> Result<String, Violation> {
    if arg >= TEMP_SIZE {
        return Err(Violation::Malformed(format!(
            "temp index {} is outside 0..{}",
            arg,
            TEMP_SIZE - 1
        )));
    }
    Ok(format!("R{}", TEMP_BASE + arg))
}

/// Pushes D, leaving SP one word higher.
fn push_d() -> Vec<String> {
    svec!["@SP", "M=M+1", "A=M-1", "M=D"]
}

/// Push microcode for the four base-pointer segments
fn seg_push(base: &str, arg: u16) -> Vec<String> {
    let mut lines = svec![
        at(base),
        "D=M",
        at(arg),
        "A=D+A", // A = base+arg
        "D=M"    // D = value to push
    ];
    lines.extend(push_d());
    lines
}

fn seg_push_direct(label: &str) -> Vec<String> {
    let mut lines = svec![at(label), "D=M"];
    lines.extend(push_d());
    lines
}

fn seg_pop(base: &str, arg: u16) -> Vec<String> {
    svec![
        at(base),
        "D=M",
        at(arg),
        "D=D+A", // D = base+arg
        at(ADDRESS),
        "M=D",
        "@SP",
        "AM=M-1", // SP--, A <- new SP (val to be popped)
        "D=M",
        at(ADDRESS),
        "A=M",
        "M=D"
    ]
}

fn seg_pop_direct(label: &str) -> Vec<String> {
    svec!["@SP", "AM=M-1", "D=M", at(label), "M=D"]
}

fn simple_un_op(comp: &str) -> Vec<String> {
    svec!["@SP", "A=M-1", format!("M={}", comp)]
}

// i.e. no conditions or jumps, just pop and run
fn simple_bin_op(comp: &str) -> Vec<String> {
    svec![
        "@SP",
        "AM=M-1", // SP--, looking at top of stack now
        "D=M",    // Right arg in D
        "A=A-1",  // Looking at left arg, will overwrite
        format!("M={}", comp)
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorConfig {
    /// Address the bootstrap loads into SP.
    pub stack_base: u16,
    /// Function the bootstrap calls after setting SP, if any.
    pub init_function: Option<String>,
    /// Precede each command's code with a `// <command>` line.
    pub comments: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        TranslatorConfig {
            stack_base: 256,
            init_function: None,
            comments: true,
        }
    }
}

/// Stateful VM to Hack assembly code generator.
///
/// One value covers a whole run: every input file is fed through the same
/// translator so comparison labels and call sites stay unique program-wide,
/// while [`Translator::set_file_name`] gives each file its own static segment.
pub struct Translator {
    comments: bool,
    output: Vec<String>,
    label_counter: usize,
    call_counter: usize,
    current_function: Option<String>,
    returned: bool,
    ends_in_goto: bool,
    unterminated: Vec<String>,
    file_stem: Option<String>,
    commands_seen: usize,
}

impl Translator {
    /// Creates a translator whose output already holds the bootstrap.
    pub fn new(config: TranslatorConfig) -> Self {
        let mut translator = Translator {
            comments: config.comments,
            output: vec![],
            label_counter: 0,
            call_counter: 0,
            current_function: None,
            returned: false,
            ends_in_goto: false,
            unterminated: vec![],
            file_stem: None,
            commands_seen: 0,
        };
        translator.bootstrap(config.stack_base, config.init_function.as_deref());
        translator
    }

    fn bootstrap(&mut self, stack_base: u16, init_function: Option<&str>) {
        if self.comments {
            self.output.push("// bootstrap".to_string());
        }
        self.output
            .extend(svec![at(stack_base), "D=A", "@SP", "M=D"]);

        if let Some(name) = init_function {
            debug!("bootstrap enters {}", name);
            if self.comments {
                self.output.push(format!("// {}", Call(name.to_string(), 0)));
            }
            let call = self.call(name, 0);
            self.output.extend(call);
        }
    }

    /// Sets the short name qualifying `static` symbols of the commands that follow.
    pub fn set_file_name(&mut self, stem: &str) {
        debug!("translating file {}", stem);
        self.file_stem = Some(stem.to_string());
    }

    fn next_label(&mut self) -> usize {
        let tmp = self.label_counter;
        self.label_counter += 1;
        tmp
    }

    fn next_call(&mut self) -> usize {
        let tmp = self.call_counter;
        self.call_counter += 1;
        tmp
    }

    fn static_sym(&self, arg: u16) -> Result<String, Violation> {
        match &self.file_stem {
            Some(stem) => Ok(format!("{}.{}", stem, arg)),
            None => Err(Violation::Precondition(
                "static segment used before a file name was set".to_string(),
            )),
        }
    }

    fn push(&self, segment: Segment, arg: u16) -> Result<Vec<String>, Violation> {
        Ok(match segment {
            Constant => {
                let mut lines = svec![at(immediate(arg, "constant")?), "D=A"];
                lines.extend(push_d());
                lines
            }
            Local => seg_push("LCL", immediate(arg, "index")?),
            Argument => seg_push("ARG", immediate(arg, "index")?),
            This => seg_push("THIS", immediate(arg, "index")?),
            That => seg_push("THAT", immediate(arg, "index")?),
            Static => seg_push_direct(&self.static_sym(arg)?),
            Temp => seg_push_direct(&temp_arg(arg)?),
            Pointer => seg_push_direct(pointer_arg(arg)?),
        })
    }

    fn pop(&self, segment: Segment, arg: u16) -> Result<Vec<String>, Violation> {
        Ok(match segment {
            Constant => {
                return Err(Violation::Precondition(
                    "the constant segment cannot be popped into".to_string(),
                ))
            }
            Local => seg_pop("LCL", immediate(arg, "index")?),
            Argument => seg_pop("ARG", immediate(arg, "index")?),
            This => seg_pop("THIS", immediate(arg, "index")?),
            That => seg_pop("THAT", immediate(arg, "index")?),
            Static => seg_pop_direct(&self.static_sym(arg)?),
            Temp => seg_pop_direct(&temp_arg(arg)?),
            Pointer => seg_pop_direct(pointer_arg(arg)?),
        })
    }

    fn compare(&mut self, opcode: &str, jump: &str) -> Vec<String> {
        let sym = self.next_label();
        let true_sym = format!("{}_TRUE.{}", opcode, sym);
        let end_sym = format!("{}_END.{}", opcode, sym);
        svec![
            "@SP",
            "AM=M-1", // SP--, looking at top of stack now
            "D=M",    // Right arg in D
            "A=A-1",  // Looking at left arg, will overwrite
            "D=M-D",
            at(&true_sym),
            format!("D;{}", jump),
            "D=0",
            at(&end_sym),
            "0;JMP",
            marker(&true_sym),
            "D=-1",
            marker(&end_sym),
            "@SP",
            "A=M-1",
            "M=D"
        ]
    }

    fn arithmetic(&mut self, op: ArithmeticOp) -> Vec<String> {
        match op {
            Add => simple_bin_op("D+M"),
            Sub => simple_bin_op("M-D"),
            And => simple_bin_op("D&M"),
            Or => simple_bin_op("D|M"),
            Neg => simple_un_op("-M"),
            Not => simple_un_op("!M"),
            Eq => self.compare("EQ", "JEQ"),
            Gt => self.compare("GT", "JGT"),
            Lt => self.compare("LT", "JLT"),
        }
    }

    /// User labels live in the namespace of the enclosing function.
    fn label_to_sym(&self, label: &str) -> String {
        match &self.current_function {
            Some(function) => format!("{}${}", function, label),
            None => label.to_string(),
        }
    }

    fn label(&self, label: &str) -> Vec<String> {
        svec![marker(&self.label_to_sym(label))]
    }

    fn goto(&self, label: &str) -> Vec<String> {
        svec![
            at(self.label_to_sym(label)),
            "0;JMP" // Unconditional jump
        ]
    }

    fn if_goto(&self, label: &str) -> Vec<String> {
        svec![
            "@SP",
            "AM=M-1",
            "D=M", // Stack popped into D
            at(self.label_to_sym(label)),
            "D;JNE" // False is 0
        ]
    }

    /// The current function, if it neither returned nor ended in a `goto`.
    fn falls_off_end(&self) -> Option<&str> {
        match &self.current_function {
            Some(function) if !self.returned && !self.ends_in_goto => Some(function.as_str()),
            _ => None,
        }
    }

    /// Functions whose body can run past its last command.
    pub fn unterminated(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.unterminated.iter().map(String::as_str).collect();
        names.extend(self.falls_off_end());
        names
    }

    fn function(&mut self, name: &str, n_locals: u16) -> Vec<String> {
        if let Some(previous) = self.falls_off_end().map(str::to_string) {
            warn!("function {} has no return", previous);
            self.unterminated.push(previous);
        }
        debug!("entering function {} with {} locals", name, n_locals);
        self.current_function = Some(name.to_string());
        self.returned = false;

        let mut lines = svec![marker(name)];
        for _ in 0..n_locals {
            lines.extend(svec!["@SP", "M=M+1", "A=M-1", "M=0"]);
        }
        lines
    }

    fn call(&mut self, name: &str, n_args: u16) -> Vec<String> {
        let ret_sym = format!("{}$ret.{}", name, self.next_call());

        let mut lines = svec![at(&ret_sym), "D=A"];
        lines.extend(push_d());
        for (register, _) in SAVED_STATE {
            lines.extend(seg_push_direct(register));
        }
        lines.extend(svec![
            // ARG = SP - 5 - nArgs
            "@SP",
            "D=M",
            at(u32::from(FRAME_SIZE) + u32::from(n_args)),
            "D=D-A",
            "@ARG",
            "M=D",
            // LCL = SP
            "@SP",
            "D=M",
            "@LCL",
            "M=D",
            at(name),
            "0;JMP",
            marker(&ret_sym)
        ]);
        lines
    }

    fn ret(&mut self) -> Vec<String> {
        self.returned = true;

        let mut lines = svec![
            "@LCL",
            "D=M",
            at(FRAME),
            "M=D", // FRAME = LCL
            at(RETURN_ADDRESS_OFFSET),
            "A=D-A",
            "D=M",
            at(RETURN_ADDRESS),
            "M=D", // RET = *(FRAME - 5), read before *ARG may overwrite it
            "@SP",
            "AM=M-1",
            "D=M",
            "@ARG",
            "A=M",
            "M=D", // *ARG = pop()
            "@ARG",
            "D=M+1",
            "@SP",
            "M=D" // SP = ARG + 1
        ];
        for (register, offset) in SAVED_STATE.iter().rev() {
            lines.extend(svec![
                at(FRAME),
                "D=M",
                at(offset),
                "A=D-A",
                "D=M",
                at(register),
                "M=D"
            ]);
        }
        lines.extend(svec![at(RETURN_ADDRESS), "A=M", "0;JMP"]);
        lines
    }

    /// Translates one command, appending its code only if it is valid.
    pub fn translate_command(&mut self, command: &Command) -> Result<(), Violation> {
        trace!("{}", command);
        let translated = match command {
            Push(seg, arg) => self.push(*seg, *arg)?,
            Pop(seg, arg) => self.pop(*seg, *arg)?,
            Arithmetic(op) => self.arithmetic(*op),
            Label(sym) => self.label(sym),
            Goto(sym) => self.goto(sym),
            IfGoto(sym) => self.if_goto(sym),
            Function(name, n_locals) => self.function(name, *n_locals),
            Call(name, n_args) => {
                immediate(n_args.saturating_add(FRAME_SIZE), "argument frame")?;
                self.call(name, *n_args)
            }
            Return => self.ret(),
        };

        if self.comments {
            self.output.push(format!("// {}", command));
        }
        self.output.extend(translated);
        self.ends_in_goto = matches!(command, Goto(_));
        Ok(())
    }

    /// Translates a command sequence, halting on the first invalid command.
    ///
    /// Reported indices count every command this translator has seen, across files.
    pub fn translate(&mut self, commands: &[Command]) -> Result<(), TranslateError> {
        for command in commands {
            let index = self.commands_seen;
            self.commands_seen += 1;
            self.translate_command(command)
                .map_err(|violation| violation.at(index, command))?;
        }
        Ok(())
    }

    pub fn lines(&self) -> &[String] {
        &self.output
    }

    pub fn finish(self) -> Vec<String> {
        if let Some(function) = self.falls_off_end() {
            warn!("function {} has no return", function);
        }
        self.output
    }

    /// Writes the whole program, one instruction per line.
    pub fn write_to<W: Write>(self, mut writer: W) -> Result<(), TranslateError> {
        for line in self.finish() {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
fn quiet() -> Translator {
    Translator::new(TranslatorConfig {
        comments: false,
        ..TranslatorConfig::default()
    })
}

#[cfg(test)]
fn translated(commands: &[Command]) -> Vec<String> {
    let mut translator = quiet();
    translator.translate(commands).unwrap();
    translator.finish()
}

#[test]
fn test_bootstrap() {
    assert_eq!(translated(&[]), vec!["@256", "D=A", "@SP", "M=D"]);

    let with_init = Translator::new(TranslatorConfig {
        stack_base: 300,
        init_function: Some("Sys.init".to_string()),
        comments: false,
    })
    .finish();
    assert_eq!(&with_init[..4], &["@300", "D=A", "@SP", "M=D"]);
    assert!(with_init.contains(&"@Sys.init".to_string()));
    assert_eq!(with_init.last().unwrap(), "(Sys.init$ret.0)");
}

#[test]
fn test_comments() {
    let mut translator = Translator::new(TranslatorConfig::default());
    translator.translate(&[Push(Local, 2)]).unwrap();
    assert_eq!(translator.lines()[0], "// bootstrap");
    assert!(translator.lines().contains(&"// push local 2".to_string()));

    let with_init = Translator::new(TranslatorConfig {
        init_function: Some("Sys.init".to_string()),
        ..TranslatorConfig::default()
    })
    .finish();
    let call = with_init.iter().position(|l| l == "// call Sys.init 0").unwrap();
    assert_eq!(with_init[call + 1], "@Sys.init$ret.0");
}

#[test]
fn test_compare_labels_unique() {
    let lines = translated(&[Arithmetic(Eq), Arithmetic(Eq), Arithmetic(Lt)]);
    for label in ["(EQ_TRUE.0)", "(EQ_END.0)", "(EQ_TRUE.1)", "(EQ_END.1)", "(LT_TRUE.2)"] {
        assert_eq!(lines.iter().filter(|l| *l == label).count(), 1, "{}", label);
    }
}

#[test]
fn test_scoped_labels() {
    let lines = translated(&[
        Label("TOP".to_string()),
        Function("Main.a".to_string(), 0),
        Label("LOOP".to_string()),
        Goto("LOOP".to_string()),
        Function("Main.b".to_string(), 0),
        IfGoto("LOOP".to_string()),
    ]);
    assert!(lines.contains(&"(TOP)".to_string()));
    assert!(lines.contains(&"(Main.a)".to_string()));
    assert!(lines.contains(&"(Main.a$LOOP)".to_string()));
    assert!(lines.contains(&"@Main.a$LOOP".to_string()));
    assert!(lines.contains(&"@Main.b$LOOP".to_string()));
}

#[test]
fn test_call_sites_unique() {
    let lines = translated(&[
        Function("Main.main".to_string(), 0),
        Call("f".to_string(), 0),
        Call("f".to_string(), 0),
    ]);
    assert!(lines.contains(&"(f$ret.0)".to_string()));
    assert!(lines.contains(&"(f$ret.1)".to_string()));
}

#[test]
fn test_call_sets_arg() {
    let lines = translated(&[Call("Sum.sum".to_string(), 2)]);
    let arg = lines.iter().position(|l| l == "D=D-A").unwrap();
    assert_eq!(lines[arg - 1], "@7");
}

#[test]
fn test_function_zeroes_locals() {
    let lines = translated(&[Function("F".to_string(), 3)]);
    assert_eq!(lines.iter().filter(|l| *l == "M=0").count(), 3);
}

#[test]
fn test_return_restores_in_reverse() {
    let lines = translated(&[Return]);
    let restored: Vec<&str> = lines
        .windows(2)
        .filter(|w| w[1] == "M=D" && ["@THAT", "@THIS", "@ARG", "@LCL"].contains(&w[0].as_str()))
        .map(|w| w[0].as_str())
        .collect();
    assert_eq!(restored, vec!["@THAT", "@THIS", "@ARG", "@LCL"]);
    assert_eq!(&lines[lines.len() - 3..], &["@R14", "A=M", "0;JMP"]);
}

#[test]
fn test_segment_violations() {
    let mut translator = quiet();
    assert!(matches!(
        translator.translate_command(&Pop(Constant, 0)),
        Err(Violation::Precondition(_))
    ));
    assert!(matches!(
        translator.translate_command(&Push(Pointer, 2)),
        Err(Violation::Malformed(_))
    ));
    assert!(matches!(
        translator.translate_command(&Pop(Temp, 8)),
        Err(Violation::Malformed(_))
    ));
    assert!(matches!(
        translator.translate_command(&Push(Constant, 40000)),
        Err(Violation::Malformed(_))
    ));
    assert!(matches!(
        translator.translate_command(&Push(Static, 0)),
        Err(Violation::Precondition(_))
    ));
    assert_eq!(translator.lines().len(), 4);

    translator.set_file_name("Foo");
    translator.translate_command(&Pop(Static, 3)).unwrap();
    assert!(translator.lines().contains(&"@Foo.3".to_string()));
}

#[test]
fn test_error_context() {
    let mut translator = quiet();
    translator
        .translate(&[Push(Constant, 1)])
        .unwrap();
    let err = translator
        .translate(&[
            Arithmetic(Not),
            Pop(Constant, 0),
            Arithmetic(Not),
        ])
        .unwrap_err();
    match err {
        TranslateError::ProtocolPrecondition { index, command, .. } => {
            assert_eq!(index, 2);
            assert_eq!(command, "pop constant 0");
        }
        other => panic!("unexpected error {}", other),
    }
}

#[test]
fn test_write_to() {
    let mut translator = quiet();
    translator
        .translate(&[Push(Temp, 2)])
        .unwrap();
    let mut sink = vec![];
    translator.write_to(&mut sink).unwrap();
    let text = String::from_utf8(sink).unwrap();
    assert!(text.starts_with("@256\nD=A\n@SP\nM=D\n@R7\nD=M\n"));
    assert!(text.ends_with("M=D\n"));
}

#[test]
fn test_static_index_is_a_name() {
    let mut translator = quiet();
    translator.set_file_name("Foo");
    translator.translate_command(&Push(Static, 40000)).unwrap();
    assert!(translator.lines().contains(&"@Foo.40000".to_string()));
    assert!(matches!(
        translator.translate_command(&Pop(Local, 40000)),
        Err(Violation::Malformed(_))
    ));
}

#[test]
fn test_unterminated_functions() {
    let mut translator = quiet();
    translator
        .translate(&[
            Function("Sys.init".to_string(), 0),
            Call("Main.f".to_string(), 0),
            Label("HALT".to_string()),
            Goto("HALT".to_string()),
            Function("Main.f".to_string(), 0),
            Push(Constant, 0),
            Function("Main.g".to_string(), 0),
            Push(Constant, 0),
            Return,
            Function("Main.h".to_string(), 0),
            Push(Constant, 0),
            IfGoto("END".to_string()),
        ])
        .unwrap();
    assert_eq!(translator.unterminated(), vec!["Main.f", "Main.h"]);
}
