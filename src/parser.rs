use nom::{
    branch::alt,
    bytes::complete::{is_a, tag},
    character::{
        complete::{digit1, space1},
        is_digit,
    },
    combinator::{map, map_res, value, verify},
    sequence::tuple,
    IResult,
};

use crate::ast::{ArithmeticOp::*, Command::*, Segment::*, *};
use crate::error::ParseError;

fn integer(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |c: &str| c.parse())(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        value(Constant, tag("constant")),
        value(Local, tag("local")),
        value(Static, tag("static")),
        value(Argument, tag("argument")),
        value(This, tag("this")),
        value(That, tag("that")),
        value(Pointer, tag("pointer")),
        value(Temp, tag("temp")),
    ))(input)
}

fn push(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("push"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Push(segment, arg),
    )(input)
}

#[test]
fn test_push() {
    assert_eq!(push("push  pointer  32"), Ok(("", Push(Pointer, 32))));
}

// `pop constant` is classified here and refused by the translator.
fn pop(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("pop"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Pop(segment, arg),
    )(input)
}

#[test]
fn test_pop() {
    assert_eq!(pop("pop\ttemp 6"), Ok(("", Pop(Temp, 6))));
    assert_eq!(pop("pop constant 1"), Ok(("", Pop(Constant, 1))));
}

fn prim(input: &str) -> IResult<&str, Command> {
    map(
        alt((
            value(Add, tag("add")),
            value(Sub, tag("sub")),
            value(Neg, tag("neg")),
            value(Eq, tag("eq")),
            value(Gt, tag("gt")),
            value(Lt, tag("lt")),
            value(And, tag("and")),
            value(Or, tag("or")),
            value(Not, tag("not")),
        )),
        Arithmetic,
    )(input)
}

#[test]
fn test_prim() {
    assert_eq!(prim("neg"), Ok(("", Arithmetic(Neg))));
}

fn symbol(input: &str) -> IResult<&str, String> {
    map(
        verify(
            is_a("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_.$:0123456789"),
            |c: &str| !is_digit(c.as_bytes()[0]),
        ),
        |sym: &str| sym.to_string(),
    )(input)
}

fn branching(input: &str) -> IResult<&str, Command> {
    map(
        tuple((
            alt((tag("label"), tag("goto"), tag("if-goto"))),
            space1,
            symbol,
        )),
        |(op, _, sym)| match op {
            "label" => Label(sym),
            "goto" => Goto(sym),
            _ => IfGoto(sym),
        },
    )(input)
}

#[test]
fn test_branching() {
    assert_eq!(
        branching("if-goto LOOP_START"),
        Ok(("", IfGoto("LOOP_START".to_string())))
    );
    assert!(branching("goto 1abc").is_err());
}

fn function(input: &str) -> IResult<&str, Command> {
    map(
        tuple((
            alt((tag("function"), tag("call"))),
            space1,
            symbol,
            space1,
            integer,
        )),
        |(op, _, name, _, n)| match op {
            "function" => Function(name, n),
            _ => Call(name, n),
        },
    )(input)
}

#[test]
fn test_function() {
    assert_eq!(
        function("function Sys.init 0"),
        Ok(("", Function("Sys.init".to_string(), 0)))
    );
    assert_eq!(
        function("call Math.multiply 2"),
        Ok(("", Call("Math.multiply".to_string(), 2)))
    );
}

fn ret(input: &str) -> IResult<&str, Command> {
    value(Return, tag("return"))(input)
}

/// Classifies every non-blank line of a VM source into a command.
pub fn parse(input: &str) -> Result<Vec<Command>, ParseError> {
    let mut commands = vec![];

    for (number, line) in input.lines().enumerate() {
        let line = line.split_once("//").map(|(s, _)| s).unwrap_or(line).trim();
        if line.is_empty() {
            continue;
        }

        match alt((push, pop, prim, branching, function, ret))(line) {
            Ok(("", command)) => commands.push(command),
            _ => {
                return Err(ParseError::InvalidLine {
                    line: number + 1,
                    text: line.to_string(),
                })
            }
        }
    }

    Ok(commands)
}

#[test]
fn test_parse() {
    let source = "\
// Computes 7 + 8
push constant 7
push constant 8   // second operand

add
function Main.main 2
return
";
    assert_eq!(
        parse(source),
        Ok(vec![
            Push(Constant, 7),
            Push(Constant, 8),
            Arithmetic(Add),
            Function("Main.main".to_string(), 2),
            Return,
        ])
    );
}

#[test]
fn test_parse_rejects() {
    assert_eq!(
        parse("push constant 1\npush heap 3"),
        Err(ParseError::InvalidLine {
            line: 2,
            text: "push heap 3".to_string()
        })
    );
    assert!(parse("mul").is_err());
    assert!(parse("add 3").is_err());
    assert!(parse("push constant 70000").is_err());
    assert!(parse("returned").is_err());
}
