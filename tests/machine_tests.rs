use micmac::{assemble, ErrorKind, Machine, MachineError, Opcode, MAX_CALL_DEPTH};

fn run(src: &str) -> Result<Machine<micmac::Program>, MachineError> {
    let program = assemble(src).unwrap();
    let mut mac = Machine::new(program)?;
    mac.run_limited(10_000)?;
    Ok(mac)
}

#[test]
fn store_and_halt() {
    let program = assemble("LOCO 5\nSTOD 100\nhalt: JUMP halt").unwrap();
    assert_eq!(program.len(), 3);
    assert_eq!(program.words().collect::<Vec<_>>(), vec![0x7005, 0x1064, 0x6002]);

    let mut mac = Machine::new(&program).unwrap();
    mac.run().unwrap();
    assert!(mac.ended());
    assert_eq!(mac.peek(100).unwrap(), 5);
    assert_eq!(mac.steps(), 3);

    assert_eq!(mac.run().unwrap_err().kind(), ErrorKind::ProgramCompleted);
    mac.reset();
    assert_eq!(mac.peek(100).unwrap(), 0);
    assert_eq!(mac.ac(), None);
    assert!(!mac.ended());
}

#[test]
fn forward_reference() {
    let program = assemble("  JUMP done\n  LOCO 1\ndone: JUMP done").unwrap();
    let (code, operand) = micmac::decode(program.get_instruction(0).unwrap());
    assert_eq!(Opcode::from_code(code), Some(Opcode::Jump));
    assert_eq!(operand, program.resolve_label("done").unwrap());
    assert_eq!(operand, 2);

    let mac = run("  JUMP done\n  LOCO 1\ndone: JUMP done").unwrap();
    assert_eq!(mac.ac(), None);
    assert_eq!(mac.steps(), 2);
}

#[test]
fn duplicate_label_cites_line() {
    let err = assemble("a: LOCO 1\nb: LOCO 2\n\na: LOCO 3").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Namespace);
    assert_eq!(err.line(), 4);
}

#[test]
fn push_pop_restores_state() {
    let mac = run("LOCO 3\nSTOD 50\nLOCO 0\nSUBD 50\nPUSH\nLOCO 1\nPOP\nx: JUMP x").unwrap();
    assert_eq!(mac.ac(), Some(-3));
    assert_eq!(mac.sp(), 4096);
    assert_eq!(mac.peek(4095).unwrap(), 0xFFFD);
}

fn call_chain(calls: usize) -> String {
    let mut src = (1..=calls)
        .map(|next| format!("CALL {next}\n"))
        .collect::<String>();
    src.push_str("end: JUMP end\n");
    src
}

#[test]
fn call_depth_limit() {
    let depth = MAX_CALL_DEPTH as usize;
    let mac = run(&call_chain(depth)).unwrap();
    assert_eq!(mac.depth(), MAX_CALL_DEPTH);
    assert_eq!(mac.sp(), 4096 - depth as i32);

    let err = run(&call_chain(depth + 1)).unwrap_err();
    assert_eq!(err, MachineError::InfiniteRecursion { depth: 100 });
}

#[test]
fn subroutine_with_locals() {
    let src = "
        LOCO 3
        PUSH
        LOCO 4
        PUSH
        CALL add
        INSP 2
        STOD result
    end: JUMP end
    add: LODL 1
        ADDL 2
        RETN
    result: DEFN 0
    ";
    let mac = run(src).unwrap();
    assert_eq!(mac.ac(), Some(7));
    assert_eq!(mac.depth(), 0);
    assert_eq!(mac.sp(), 4096);
    assert_eq!(mac.peek(11).unwrap(), 7);
}

#[test]
fn countdown_loop() {
    let src = "
    ; count n down to zero, tallying iterations
    loop: LODD n
          JZER done
          SUBD one
          STOD n
          LODD count
          ADDD one
          STOD count
          JUMP loop
    done: JUMP done
    n:     DEFN 0x000A
    one:   DEFN 1
    count: DEFN 0
    ";
    let mac = run(src).unwrap();
    assert_eq!(mac.peek(9).unwrap(), 0);
    assert_eq!(mac.peek(11).unwrap(), 10);
}

#[test]
fn raw_words_run() {
    let mut mac = Machine::new(vec![0x7005u16, 0xF400, 0x6002]).unwrap();
    mac.run().unwrap();
    assert_eq!(mac.ac(), Some(5));
    assert_eq!(mac.peek(4095).unwrap(), 5);
}

#[test]
fn runtime_errors() {
    let kind = |src: &str| run(src).unwrap_err().kind();
    assert_eq!(kind("POP"), ErrorKind::StackUnderflow);
    assert_eq!(kind("RETN"), ErrorKind::StackUnderflow);
    assert_eq!(kind("STOD 5"), ErrorKind::UninitializedAccumulator);
    assert_eq!(kind("LOCO 1\nSWAP\nLODL 4095"), ErrorKind::AddressOutOfBounds);
    assert_eq!(kind("DEFN 0xF100"), ErrorKind::UndefinedOperation);
    assert_eq!(kind("x: LOCO 1\nJUMP x"), ErrorKind::StepLimit);
}
