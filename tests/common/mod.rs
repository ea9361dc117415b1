//! A small Hack machine: resolves symbols the way the assembler does and
//! executes the program with 16-bit two's-complement words.

#![allow(dead_code)]

use std::collections::HashMap;

use vmtrans::ast::Command;
use vmtrans::translator::{Translator, TranslatorConfig};

pub const RAM_SIZE: usize = 0x8000;

// Base pointers a test installs before running, to check they survive calls.
pub const LCL: i16 = 300;
pub const ARG: i16 = 400;
pub const THIS: i16 = 3000;
pub const THAT: i16 = 3010;

const COMPS: [&str; 18] = [
    "0", "1", "-1", "D", "A", "!D", "!A", "-D", "-A", "D+1", "A+1", "D-1", "A-1", "D+A", "D-A",
    "A-D", "D&A", "D|A",
];

const JUMPS: [&str; 7] = ["JGT", "JEQ", "JGE", "JLT", "JNE", "JLE", "JMP"];

#[derive(Debug, Clone)]
enum Instr {
    A(u16),
    C {
        dest: String,
        comp: String,
        jump: Option<String>,
    },
}

pub struct Hack {
    rom: Vec<Instr>,
    symbols: HashMap<String, u16>,
    pub ram: Vec<i16>,
    pub a: i16,
    pub d: i16,
    pub pc: usize,
}

fn predefined() -> HashMap<String, u16> {
    let mut symbols: HashMap<String, u16> = [
        ("SP", 0),
        ("LCL", 1),
        ("ARG", 2),
        ("THIS", 3),
        ("THAT", 4),
        ("SCREEN", 0x4000),
        ("KBD", 0x6000),
    ]
    .into_iter()
    .map(|(name, address)| (name.to_string(), address))
    .collect();
    for r in 0..16 {
        symbols.insert(format!("R{}", r), r);
    }
    symbols
}

fn c_instr(text: &str) -> Instr {
    let (body, jump) = match text.split_once(';') {
        Some((body, jump)) => (body, Some(jump.to_string())),
        None => (text, None),
    };
    let (dest, comp) = match body.split_once('=') {
        Some((dest, comp)) => (dest.to_string(), comp.to_string()),
        None => (String::new(), body.to_string()),
    };

    assert!(
        dest.chars().all(|c| "AMD".contains(c)),
        "bad dest in {}",
        text
    );
    assert!(
        !(comp.contains('A') && comp.contains('M')) && COMPS.contains(&comp.replace('M', "A").as_str()),
        "non-canonical comp in {}",
        text
    );
    if let Some(jump) = &jump {
        assert!(JUMPS.contains(&jump.as_str()), "bad jump in {}", text);
    }

    Instr::C { dest, comp, jump }
}

impl Hack {
    pub fn assemble(lines: &[String]) -> Self {
        let code: Vec<&str> = lines
            .iter()
            .map(|l| l.split_once("//").map(|(s, _)| s).unwrap_or(l).trim())
            .filter(|l| !l.is_empty())
            .collect();

        let mut symbols = predefined();
        let mut address = 0;
        for line in &code {
            if let Some(label) = line.strip_prefix('(').and_then(|l| l.strip_suffix(')')) {
                let previous = symbols.insert(label.to_string(), address);
                assert!(previous.is_none(), "label {} defined twice", label);
            } else {
                address += 1;
            }
        }

        let mut next_variable = 16;
        let mut rom = vec![];
        for line in code {
            if line.starts_with('(') {
                continue;
            }
            let instr = match line.strip_prefix('@') {
                Some(value) => match value.parse::<u16>() {
                    Ok(value) => {
                        assert!(value <= 0x7FFF, "immediate {} too large", value);
                        Instr::A(value)
                    }
                    Err(_) => Instr::A(*symbols.entry(value.to_string()).or_insert_with(|| {
                        next_variable += 1;
                        next_variable - 1
                    })),
                },
                None => c_instr(line),
            };
            rom.push(instr);
        }

        Hack {
            rom,
            symbols,
            ram: vec![0; RAM_SIZE],
            a: 0,
            d: 0,
            pc: 0,
        }
    }

    /// Translates top-level commands, then appends each file under its own name.
    pub fn translate(config: TranslatorConfig, files: &[(&str, Vec<Command>)]) -> Self {
        let mut translator = Translator::new(config);
        for (stem, commands) in files {
            translator.set_file_name(stem);
            translator.translate(commands).unwrap();
        }
        let mut hack = Hack::assemble(&translator.finish());
        hack.ram[1] = LCL;
        hack.ram[2] = ARG;
        hack.ram[3] = THIS;
        hack.ram[4] = THAT;
        hack
    }

    pub fn address(&self, symbol: &str) -> u16 {
        match self.symbols.get(symbol) {
            Some(address) => *address,
            None => panic!("unknown symbol {}", symbol),
        }
    }

    pub fn sp(&self) -> i16 {
        self.ram[0]
    }

    /// Word `depth` slots below the top of the stack; 0 is the top.
    pub fn peek(&self, depth: i16) -> i16 {
        self.ram[(self.sp() - 1 - depth) as usize]
    }

    pub fn symbol_value(&self, symbol: &str) -> i16 {
        self.ram[self.address(symbol) as usize]
    }

    fn m(&self) -> usize {
        self.a as u16 as usize
    }

    fn comp(&self, comp: &str) -> i16 {
        let x = self.d;
        let y = if comp.contains('M') {
            self.ram[self.m()]
        } else {
            self.a
        };
        match comp.replace('M', "A").as_str() {
            "0" => 0,
            "1" => 1,
            "-1" => -1,
            "D" => x,
            "A" => y,
            "!D" => !x,
            "!A" => !y,
            "-D" => x.wrapping_neg(),
            "-A" => y.wrapping_neg(),
            "D+1" => x.wrapping_add(1),
            "A+1" => y.wrapping_add(1),
            "D-1" => x.wrapping_sub(1),
            "A-1" => y.wrapping_sub(1),
            "D+A" => x.wrapping_add(y),
            "D-A" => x.wrapping_sub(y),
            "A-D" => y.wrapping_sub(x),
            "D&A" => x & y,
            "D|A" => x | y,
            other => panic!("unknown comp {}", other),
        }
    }

    pub fn step(&mut self) {
        match self.rom[self.pc].clone() {
            Instr::A(value) => {
                self.a = value as i16;
                self.pc += 1;
            }
            Instr::C { dest, comp, jump } => {
                let out = self.comp(&comp);
                let target = self.m();
                if dest.contains('M') {
                    self.ram[target] = out;
                }
                if dest.contains('A') {
                    self.a = out;
                }
                if dest.contains('D') {
                    self.d = out;
                }
                let taken = match jump.as_deref() {
                    None => false,
                    Some("JGT") => out > 0,
                    Some("JEQ") => out == 0,
                    Some("JGE") => out >= 0,
                    Some("JLT") => out < 0,
                    Some("JNE") => out != 0,
                    Some("JLE") => out <= 0,
                    Some(_) => true,
                };
                self.pc = if taken { target } else { self.pc + 1 };
            }
        }
    }

    /// Runs until control reaches `label`, returning the number of instructions executed.
    pub fn run_until(&mut self, label: &str) -> usize {
        let stop = self.address(label) as usize;
        let mut steps = 0;
        while self.pc != stop {
            assert!(self.pc < self.rom.len(), "ran off the end of the program");
            assert!(steps < 1_000_000, "no halt after {} steps", steps);
            self.step();
            steps += 1;
        }
        steps
    }
}
