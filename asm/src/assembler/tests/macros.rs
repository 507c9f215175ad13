use super::*;

#[test_log::test]
fn labels_are_local_to_each_invocation() {
    let data = code(
        r#"
Simple: .macro()
    ThisLabel: ld bc,ThisLabel
.endm
Simple()
Simple()
"#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x01, 0x00, 0x80,
        0x01, 0x03, 0x80,
    ], data);
}

#[test_log::test]
fn arguments_substitute_their_text() {
    let data = code(
        r#"
LdPair: .macro(dst, src)
    ld {{dst}},{{ src }}
.endm
Emit: .macro(stmt)
    {{stmt}}
.endm
LdPair(a, b)
LdPair((ix+2), c)
Emit("nop")
Emit("ld a,b")
"#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x78,
        0xDD, 0x71, 0x02,
        0x00,
        0x78,
    ], data);
}

#[test_log::test]
fn macro_time_functions_inspect_arguments() {
    let data = code(
        r#"
Load: .macro(src)
    .if isreg16({{src}})
        ld {{src}},0
    .else
        ld {{src}},1
    .endif
.endm
Opt: .macro(value)
    .defb def({{value}})
.endm
Load(b)
Load(hl)
Opt(3)
Opt()
Opt("")
"#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x06, 0x01,
        0x21, 0x00, 0x00,
        0x01,
        0x00,
        0x00,
    ], data);
}

#[test_log::test]
fn macro_name_is_the_invocation_address() {
    let data = code(
        r#"
        .org $4000
        nop
Here: .macro()
    .defw Here
.endm
        Here()
"#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x00,
        0x01, 0x40,
    ], data);
}

#[test_log::test]
fn end_label_marks_the_end_of_the_expansion() {
    let data = code(
        r#"
Simple: .macro()
    ld bc,EndLabel
    nop
EndLabel: .endm
Simple()
Simple()
"#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x01, 0x04, 0x80, 0x00,
        0x01, 0x08, 0x80, 0x00,
    ], data);
}

#[test_log::test]
fn forward_references_inside_the_body() {
    let data = code(
        r#"
Simple: .macro()
    jp Later
    nop
Later: .endm
Jumps: .macro()
    jp Target
Target: nop
.endm
Simple()
Jumps()
Jumps()
"#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0xC3, 0x04, 0x80, 0x00,
        0xC3, 0x07, 0x80, 0x00,
        0xC3, 0x0B, 0x80, 0x00,
    ], data);
}

#[test_log::test]
fn forward_references_out_of_the_body() {
    let data = code(
        r#"
Simple: .macro()
    ld bc,OuterLabel
    nop
.endm
Simple()
Simple()
OuterLabel: nop
"#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x01, 0x08, 0x80, 0x00,
        0x01, 0x08, 0x80, 0x00,
        0x00,
    ], data);
}

#[test_log::test]
fn omitted_arguments() {
    let data = code(
        r#"
Simple: .macro(arg1, arg2)
    .if def({{arg1}})
        ld a,b
    .endif
    .if def({{arg2}})
        ld b,a
    .endif
.endm
Simple(, 13)
Simple(12)
"#,
    );
    assert_eq!(vec![0x47, 0x78], data);
}

#[test_log::test]
fn omitted_arguments_in_skipped_lines() {
    let data = code(
        r#"
LdBcDeHl:
    .macro(bcVal, deVal, hlVal)
        .if def({{bcVal}})
            ld bc,{{bcVal}}
        .endif
        .if def({{deVal}})
            ld de,{{deVal}}
        .endif
        .if def({{hlVal}})
            ld hl,{{hlVal}}
        .endif
    .endm
    LdBcDeHl(,#1000, #2000)
"#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x11, 0x00, 0x10,
        0x21, 0x00, 0x20,
    ], data);
}

#[test_log::test]
fn unparsable_expanded_lines_fail_when_reached() {
    let assembled = assemble("Ld3: .macro(a1)
 ld de,{{a1}}
.endm
Ld3()");
    let chain: Vec<_> = assembled
        .errors
        .iter()
        .map(|(loc, e)| (loc.line, e.code()))
        .collect();
    assert_eq!(vec![(4, "Z1012"), (2, "Z0101")], chain);
}

#[test_log::test]
fn definition_errors() {
    assert_eq!(vec!["Z1001"], errors("Mac: .macro(a, a)\n.endm"));
    assert_eq!(vec!["Z1002"], errors("  .macro()\n.endm"));
    assert_eq!(vec!["Z1003"], errors("`Mac: .macro()\n.endm"));
    assert_eq!(
        vec!["Z1004"],
        errors("Mac: .macro()\n.endm\nMac: .macro()\n.endm")
    );
    assert_eq!(vec!["Z1006"], errors("Mac: .macro(a)\n ld a,{{b}}\n.endm"));
}

#[test_log::test]
fn invocation_errors() {
    assert_eq!(vec!["Z1007"], errors("Missing()"));
    assert_eq!(vec!["Z1008"], errors("Mac: .macro(a)\n nop\n.endm\nMac(1, 2)"));
    assert_eq!(vec!["Z1014"], errors("Mac: .macro()\n nop\n.endm\nMac"));
    assert_eq!(vec!["Z1011"], errors(" ld a,{{b}}"));
}

#[test_log::test]
fn errors_report_the_invocation_chain() {
    let assembled = assemble(
        r#"
Inner: .macro()
    .defb 1/0
.endm
Outer: .macro()
    Inner()
.endm
Outer()
"#,
    );
    let chain: Vec<_> = assembled
        .errors
        .iter()
        .map(|(loc, e)| (loc.line, e.code()))
        .collect();
    assert_eq!(vec![(6, "Z1012"), (8, "Z1012"), (3, "Z0606")], chain);
}

#[test_log::test]
fn failing_arguments_abandon_the_invocation() {
    let assembled = assemble("Mac: .macro(a)\n .defb {{a}}\n.endm\nMac(1/0)\nnop");
    assert_eq!(vec!["Z1012", "Z0606"], error_codes(&assembled));
    assert_eq!(vec![0x00], assembled.segments[0].emitted_code);
}

#[test_log::test]
fn late_failures_keep_the_invocation_chain() {
    let assembled = assemble("M1: .macro(a)\n .defb {{a}}\n.endm\nM1(1/Zero)\nZero: .equ 0");
    let chain: Vec<_> = assembled
        .errors
        .iter()
        .map(|(loc, e)| (loc.line, e.code()))
        .collect();
    assert_eq!(vec![(4, "Z1012"), (2, "Z0606")], chain);
}

#[test_log::test]
fn runaway_recursion_is_stopped() {
    let assembled = assemble("Rec: .macro()\n Rec()\n.endm\nRec()");
    let codes = error_codes(&assembled);
    assert_eq!(Some(&"Z1015"), codes.last());
    assert_eq!(64, codes.iter().filter(|code| **code == "Z1012").count());
}

#[test_log::test]
fn structs() {
    let data = code(
        r#"
Point: .struct
    Flags: .defb 1
    Addr: .defw $1234
.ends
    .defb Point, Point.Flags, Point.Addr
    Point()
    Addr -> .defw $5678
    Point()
    -> .defb 9
"#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x03, 0x00, 0x01,
        0x01, 0x78, 0x56,
        0x09, 0x34, 0x12,
    ], data);
}

#[test_log::test]
fn struct_errors() {
    assert_eq!(vec!["Z0804"], errors("  .struct\n .defb 1\n.ends"));
    assert_eq!(vec!["Z0808"], errors("S: .struct\n nop\n.ends"));
    assert_eq!(
        vec!["Z0810"],
        errors("S: .struct\nA1: .defb 1\nA1: .defb 2\n.ends")
    );
    assert_eq!(vec!["Z0809"], errors("S: .struct\n .defb 1\n.ends\nS(1)"));
    assert_eq!(vec!["Z1013"], errors("S: .struct\n .defb 1\n.ends\nS"));
    assert_eq!(vec!["Z0803"], errors("-> .defb 1"));
    assert_eq!(
        vec!["Z0802"],
        errors("S: .struct\n .defb 1\n.ends\nS()\nNope -> .defb 2")
    );
    assert_eq!(
        vec!["Z0801"],
        errors("S: .struct\n .defb 1\n.ends\nS()\n-> .defw 2")
    );
}
