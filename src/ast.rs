use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Segment {
    Constant,
    Local,
    Static,
    Argument,
    This,
    That,
    Pointer,
    Temp,
}

impl Segment {
    pub fn name(self) -> &'static str {
        match self {
            Segment::Constant => "constant",
            Segment::Local => "local",
            Segment::Static => "static",
            Segment::Argument => "argument",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl ArithmeticOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Neg => "neg",
            ArithmeticOp::Eq => "eq",
            ArithmeticOp::Gt => "gt",
            ArithmeticOp::Lt => "lt",
            ArithmeticOp::And => "and",
            ArithmeticOp::Or => "or",
            ArithmeticOp::Not => "not",
        }
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
    // Stack
    Arithmetic(ArithmeticOp),
    Push(Segment, u16),
    Pop(Segment, u16),

    // Branching
    Label(String),
    Goto(String),
    IfGoto(String),

    // Functions
    Function(String, u16),
    Call(String, u16),
    Return,
}

impl Command {
    /// Short name of the command kind, as written in VM source.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Arithmetic(op) => op.mnemonic(),
            Command::Push(..) => "push",
            Command::Pop(..) => "pop",
            Command::Label(_) => "label",
            Command::Goto(_) => "goto",
            Command::IfGoto(_) => "if-goto",
            Command::Function(..) => "function",
            Command::Call(..) => "call",
            Command::Return => "return",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::Arithmetic(op) => write!(f, "{}", op),
            Command::Push(seg, arg) | Command::Pop(seg, arg) => {
                write!(f, "{} {} {}", self.kind(), seg, arg)
            }
            Command::Label(sym) | Command::Goto(sym) | Command::IfGoto(sym) => {
                write!(f, "{} {}", self.kind(), sym)
            }
            Command::Function(name, n) | Command::Call(name, n) => {
                write!(f, "{} {} {}", self.kind(), name, n)
            }
            Command::Return => f.write_str("return"),
        }
    }
}

#[test]
fn test_display() {
    assert_eq!(Command::Push(Segment::Local, 2).to_string(), "push local 2");
    assert_eq!(Command::IfGoto("LOOP".into()).to_string(), "if-goto LOOP");
    assert_eq!(Command::Call("Main.f".into(), 2).to_string(), "call Main.f 2");
    assert_eq!(Command::Arithmetic(ArithmeticOp::Lt).to_string(), "lt");
    assert_eq!(Command::Return.to_string(), "return");
}
