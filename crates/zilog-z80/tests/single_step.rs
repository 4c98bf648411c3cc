//! Single-instruction cases described as JSON, in the shape of the
//! SingleStepTests corpus: an initial state, an expected final state and
//! the T-state cost. Registers left out of `final` are not checked.

use emu_core::{SimpleBus, Step};
use serde::Deserialize;
use zilog_z80::Z80;

#[derive(Deserialize)]
struct TestCase {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    final_state: CpuState,
    cycles: u32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CpuState {
    pc: Option<u16>,
    sp: Option<u16>,
    a: Option<u8>,
    f: Option<u8>,
    b: Option<u8>,
    c: Option<u8>,
    d: Option<u8>,
    e: Option<u8>,
    h: Option<u8>,
    l: Option<u8>,
    ix: Option<u16>,
    iy: Option<u16>,
    ram: Vec<(u16, u8)>,
}

const CASES: &str = r#"[
  {
    "name": "80 ADD A,B overflow",
    "initial": { "pc": 256, "a": 127, "b": 1, "f": 0, "ram": [[256, 128]] },
    "final": { "pc": 257, "a": 128, "f": 148 },
    "cycles": 4
  },
  {
    "name": "dd 36 LD (IX+d),n negative displacement",
    "initial": { "pc": 256, "ix": 12290, "ram": [[256, 221], [257, 54], [258, 254], [259, 90]] },
    "final": { "pc": 260, "ram": [[12288, 90]] },
    "cycles": 19
  },
  {
    "name": "e3 EX (SP),HL",
    "initial": { "pc": 256, "sp": 16384, "h": 171, "l": 205,
                 "ram": [[256, 227], [16384, 52], [16385, 18]] },
    "final": { "pc": 257, "sp": 16384, "h": 18, "l": 52,
               "ram": [[16384, 205], [16385, 171]] },
    "cycles": 19
  },
  {
    "name": "ed 52 SBC HL,DE with carry",
    "initial": { "pc": 256, "h": 16, "l": 0, "d": 0, "e": 1, "f": 1,
                 "ram": [[256, 237], [257, 82]] },
    "final": { "pc": 258, "h": 15, "l": 254, "f": 26 },
    "cycles": 15
  },
  {
    "name": "ed 44 NEG",
    "initial": { "pc": 256, "a": 1, "ram": [[256, 237], [257, 68]] },
    "final": { "pc": 258, "a": 255, "f": 187 },
    "cycles": 8
  },
  {
    "name": "ed 6f RLD",
    "initial": { "pc": 256, "a": 18, "f": 0, "h": 80, "l": 0,
                 "ram": [[256, 237], [257, 111], [20480, 52]] },
    "final": { "pc": 258, "a": 19, "f": 0, "ram": [[20480, 66]] },
    "cycles": 18
  },
  {
    "name": "2f CPL",
    "initial": { "pc": 256, "a": 90, "f": 0, "ram": [[256, 47]] },
    "final": { "pc": 257, "a": 165, "f": 50 },
    "cycles": 4
  },
  {
    "name": "10 DJNZ taken onto itself",
    "initial": { "pc": 256, "b": 2, "ram": [[256, 16], [257, 254]] },
    "final": { "pc": 256, "b": 1 },
    "cycles": 13
  },
  {
    "name": "c0 RET NZ not taken",
    "initial": { "pc": 256, "sp": 16384, "f": 64, "ram": [[256, 192]] },
    "final": { "pc": 257, "sp": 16384 },
    "cycles": 5
  },
  {
    "name": "fd 7c LD A,IYH",
    "initial": { "pc": 256, "iy": 43981, "ram": [[256, 253], [257, 124]] },
    "final": { "pc": 258, "a": 171, "iy": 43981 },
    "cycles": 8
  },
  {
    "name": "fd cb 03 1e RR (IY+3)",
    "initial": { "pc": 256, "iy": 8192, "f": 1,
                 "ram": [[256, 253], [257, 203], [258, 3], [259, 30], [8195, 2]] },
    "final": { "pc": 260, "f": 132, "ram": [[8195, 129]] },
    "cycles": 23
  }
]"#;

fn setup(cpu: &mut Z80, bus: &mut SimpleBus, state: &CpuState) {
    for &(addr, value) in &state.ram {
        bus.load(addr, &[value]);
    }
    let r = &mut cpu.regs;
    macro_rules! apply {
        ($($field:ident),*) => {
            $(if let Some(v) = state.$field { r.$field = v; })*
        };
    }
    apply!(pc, sp, a, f, b, c, d, e, h, l, ix, iy);
}

fn compare(cpu: &Z80, bus: &SimpleBus, expected: &CpuState) -> Vec<String> {
    let mut errors = Vec::new();
    let r = &cpu.regs;
    macro_rules! check {
        ($($field:ident),*) => {
            $(if let Some(want) = expected.$field {
                if r.$field != want {
                    errors.push(format!(
                        "{}: got {:#X}, want {:#X}",
                        stringify!($field),
                        r.$field,
                        want
                    ));
                }
            })*
        };
    }
    check!(pc, sp, a, f, b, c, d, e, h, l, ix, iy);

    for &(addr, want) in &expected.ram {
        let got = bus.peek(addr);
        if got != want {
            errors.push(format!("RAM[{addr:04X}]: got {got:02X}, want {want:02X}"));
        }
    }
    errors
}

#[test]
fn single_step_cases() {
    let cases: Vec<TestCase> = serde_json::from_str(CASES).expect("cases parse");
    let mut failures = Vec::new();

    for case in &cases {
        let mut cpu = Z80::new();
        let mut bus = SimpleBus::new();
        setup(&mut cpu, &mut bus, &case.initial);

        let cycles = match cpu.step(&mut bus) {
            Ok(Step::Executed { cycles }) => cycles,
            other => {
                failures.push(format!("{}: {other:?}", case.name));
                continue;
            }
        };

        let mut errors = compare(&cpu, &bus, &case.final_state);
        if cycles != case.cycles {
            errors.push(format!("cycles: got {cycles}, want {}", case.cycles));
        }
        if !errors.is_empty() {
            failures.push(format!("{}: {}", case.name, errors.join(", ")));
        }
    }

    assert!(failures.is_empty(), "{}", failures.join("\n"));
}
