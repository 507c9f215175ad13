use super::*;

#[test]
fn adc() {
    let data = code(
        r#"
            adc a, a
            adc a, b
            adc a, c
            adc a, d
            adc a, e
            adc a, h
            adc a, l
            adc a, ixh
            adc a, ixl
            adc a, iyh
            adc a, iyl
            adc a, (hl)
            adc a, $42
            adc a, (ix+1)
            adc a, (iy+1)
            adc hl, bc
            adc hl, de
            adc hl, hl
            adc hl, sp
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x8F,
        0x88,
        0x89,
        0x8A,
        0x8B,
        0x8C,
        0x8D,
        0xDD, 0x8C,
        0xDD, 0x8D,
        0xFD, 0x8C,
        0xFD, 0x8D,
        0x8E,
        0xCE, 0x42,
        0xDD, 0x8E, 0x01,
        0xFD, 0x8E, 0x01,
        0xED, 0x4A,
        0xED, 0x5A,
        0xED, 0x6A,
        0xED, 0x7A,
    ], data);
}

#[test]
fn add() {
    let data = code(
        r#"
            add a, a
            add a, b
            add a, c
            add a, d
            add a, e
            add a, h
            add a, l
            add a, ixh
            add a, ixl
            add a, iyh
            add a, iyl
            add a, (hl)
            add a, $42
            add a, (ix+1)
            add a, (iy+1)
            add hl, bc
            add hl, de
            add hl, hl
            add hl, sp
            add ix, bc
            add ix, de
            add ix, ix
            add ix, sp
            add iy, bc
            add iy, de
            add iy, iy
            add iy, sp
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x87,
        0x80,
        0x81,
        0x82,
        0x83,
        0x84,
        0x85,
        0xDD, 0x84,
        0xDD, 0x85,
        0xFD, 0x84,
        0xFD, 0x85,
        0x86,
        0xC6, 0x42,
        0xDD, 0x86, 0x01,
        0xFD, 0x86, 0x01,
        0x09,
        0x19,
        0x29,
        0x39,
        0xDD, 0x09,
        0xDD, 0x19,
        0xDD, 0x29,
        0xDD, 0x39,
        0xFD, 0x09,
        0xFD, 0x19,
        0xFD, 0x29,
        0xFD, 0x39,
    ], data);
}

#[test]
fn alu_without_accumulator() {
    let data = code(
        r#"
            and a, a
            and (hl)
            sub b
            sub a, b
            sbc a, (ix+1)
            sbc hl, de
            xor (hl)
            or ixl
            cp $10
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0xA7,
        0xA6,
        0x90,
        0x90,
        0xDD, 0x9E, 0x01,
        0xED, 0x52,
        0xAE,
        0xDD, 0xB5,
        0xFE, 0x10,
    ], data);
}

#[test]
fn alu_errors() {
    assert_eq!(vec!["Z0408"], errors("sub b, c"));
    assert_eq!(vec!["Z0409"], errors("add b, c"));
    assert_eq!(vec!["Z0604"], errors("add ix, iy"));
    assert_eq!(vec!["Z0414"], errors("add hl, a"));
}

#[test]
fn bit() {
    let data = code(
        r#"
            bit 0, a
            bit 1, b
            bit 2, c
            bit 3, d
            bit 4, e
            bit 5, h
            bit 6, l
            bit 7, (hl)
            bit 0, (ix+1)
            bit 1, (iy+1)
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0xCB, 0x47,
        0xCB, 0x48,
        0xCB, 0x51,
        0xCB, 0x5A,
        0xCB, 0x63,
        0xCB, 0x6C,
        0xCB, 0x75,
        0xCB, 0x7E,
        0xDD, 0xCB, 0x01, 0x46,
        0xFD, 0xCB, 0x01, 0x4E,
    ], data);

    assert_eq!(vec!["Z0407"], errors("bit 8, a"));
}

#[test]
fn res_and_set() {
    let data = code(
        r#"
            res 0, a
            set 7, (hl)
            res 1, (ix+1)
            set 2, (iy+3), b
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0xCB, 0x87,
        0xCB, 0xFE,
        0xDD, 0xCB, 0x01, 0x8E,
        0xFD, 0xCB, 0x03, 0xD0,
    ], data);
}

#[test]
fn call() {
    let data = code(
        r#"
            .org $0100
            target: nop
            call target
            call nz, target
            call z, target
            call nc, target
            call c, target
            call po, target
            call pe, target
            call p, target
            call m, target
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x00,
        0xCD, 0x00, 0x01,
        0xC4, 0x00, 0x01,
        0xCC, 0x00, 0x01,
        0xD4, 0x00, 0x01,
        0xDC, 0x00, 0x01,
        0xE4, 0x00, 0x01,
        0xEC, 0x00, 0x01,
        0xF4, 0x00, 0x01,
        0xFC, 0x00, 0x01,
    ], data);
}

#[test]
fn simple() {
    let data = code(
        r#"
            nop
            halt
            ccf
            exx
            ldir
            neg
            reti
            rld
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x00,
        0x76,
        0x3F,
        0xD9,
        0xED, 0xB0,
        0xED, 0x44,
        0xED, 0x4D,
        0xED, 0x6F,
    ], data);
}

#[test]
fn djnz() {
    let data = code(
        r#"
            .org 0
            again: djnz again
            djnz later
            nop
            later: nop
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x10, -2i8 as u8,
        0x10, 0x01,
        0x00,
        0x00,
    ], data);
}

#[test]
fn ex() {
    let data = code(
        r#"
            ex af, af'
            ex de, hl
            ex (sp), hl
            ex (sp), ix
            ex (sp), iy
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x08,
        0xEB,
        0xE3,
        0xDD, 0xE3,
        0xFD, 0xE3,
    ], data);
}

#[test]
fn im_and_rst() {
    let data = code(
        r#"
            im 0
            im 1
            im 2
            rst 0
            rst $08
            rst $38
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0xED, 0x46,
        0xED, 0x56,
        0xED, 0x5E,
        0xC7,
        0xCF,
        0xFF,
    ], data);

    assert_eq!(vec!["Z0405"], errors("im 3"));
    assert_eq!(vec!["Z0404"], errors("rst 3"));
}

#[test]
fn ports() {
    let data = code(
        r#"
            in a, ($FE)
            in b, (c)
            in a, (c)
            in (c)
            out ($FE), a
            out (c), e
            out (c), 0
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0xDB, 0xFE,
        0xED, 0x40,
        0xED, 0x78,
        0xED, 0x70,
        0xD3, 0xFE,
        0xED, 0x59,
        0xED, 0x71,
    ], data);

    assert_eq!(vec!["Z0406"], errors("out (c), 1"));
}

#[test]
fn inc_and_dec() {
    let data = code(
        r#"
            inc a
            inc b
            inc ixh
            inc bc
            inc sp
            inc ix
            inc (hl)
            inc (ix+1)
            dec a
            dec c
            dec iyl
            dec de
            dec iy
            dec (hl)
            dec (iy+2)
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x3C,
        0x04,
        0xDD, 0x24,
        0x03,
        0x33,
        0xDD, 0x23,
        0x34,
        0xDD, 0x34, 0x01,
        0x3D,
        0x0D,
        0xFD, 0x2D,
        0x1B,
        0xFD, 0x2B,
        0x35,
        0xFD, 0x35, 0x02,
    ], data);
}

#[test]
fn jp() {
    let data = code(
        r#"
            .org $0100
            target: nop
            jp target
            jp nz, target
            jp z, target
            jp nc, target
            jp c, target
            jp po, target
            jp pe, target
            jp p, target
            jp m, target
            jp (hl)
            jp (ix)
            jp (iy)
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x00,
        0xC3, 0x00, 0x01,
        0xC2, 0x00, 0x01,
        0xCA, 0x00, 0x01,
        0xD2, 0x00, 0x01,
        0xDA, 0x00, 0x01,
        0xE2, 0x00, 0x01,
        0xEA, 0x00, 0x01,
        0xF2, 0x00, 0x01,
        0xFA, 0x00, 0x01,
        0xE9,
        0xDD, 0xE9,
        0xFD, 0xE9,
    ], data);
}

#[test]
fn jr() {
    let data = code(
        r#"
            .org 100
            bar: nop
            .org 0
            foo: jr foo
            jr bar
            foo1: jr nz, foo1
            jr nz, bar
            foo2: jr z, foo2
            jr z, bar
            foo3: jr nc, foo3
            jr nc, bar
            foo4: jr c, foo4
            jr c, bar
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x00,
        0x18, -2i8 as u8,
        0x18, 96,
        0x20, -2i8 as u8,
        0x20, 92,
        0x28, -2i8 as u8,
        0x28, 88,
        0x30, -2i8 as u8,
        0x30, 84,
        0x38, -2i8 as u8,
        0x38, 80,
    ], data);
}

#[test]
fn jr_errors() {
    assert_eq!(vec!["Z0403"], errors(".org 0\njr 200"));
    assert_eq!(vec!["Z0402"], errors("jr po, 0"));
    assert_eq!(vec!["Z0403"], errors("jr Far\n.defs 200\nFar: nop"));
}

#[test]
fn ld() {
    let data = code(
        r#"
            .org 0
            target:
            ld a, a
            ld a, b
            ld a, ixh
            ld a, i
            ld a, r
            ld a, (bc)
            ld a, (de)
            ld a, (hl)
            ld a, (ix+1)
            ld a, (iy+1)
            ld a, (target)
            ld a, $42
            ld h, (ix+1)
            ld ixh, b
            ld ixh, ixl
            ld iyl, $42
            ld (hl), b
            ld (hl), $42
            ld (ix+1), a
            ld (iy-2), $42
            ld (bc), a
            ld (de), a
            ld (target), a
            ld bc, $1234
            ld sp, hl
            ld sp, iy
            ld ix, $1234
            ld hl, (target)
            ld de, (target)
            ld iy, (target)
            ld (target), hl
            ld (target), sp
            ld (target), ix
            ld i, a
            ld r, a
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x7F,
        0x78,
        0xDD, 0x7C,
        0xED, 0x57,
        0xED, 0x5F,
        0x0A,
        0x1A,
        0x7E,
        0xDD, 0x7E, 0x01,
        0xFD, 0x7E, 0x01,
        0x3A, 0x00, 0x00,
        0x3E, 0x42,
        0xDD, 0x66, 0x01,
        0xDD, 0x60,
        0xDD, 0x65,
        0xFD, 0x2E, 0x42,
        0x70,
        0x36, 0x42,
        0xDD, 0x77, 0x01,
        0xFD, 0x36, 0xFE, 0x42,
        0x02,
        0x12,
        0x32, 0x00, 0x00,
        0x01, 0x34, 0x12,
        0xF9,
        0xFD, 0xF9,
        0xDD, 0x21, 0x34, 0x12,
        0x2A, 0x00, 0x00,
        0xED, 0x5B, 0x00, 0x00,
        0xFD, 0x2A, 0x00, 0x00,
        0x22, 0x00, 0x00,
        0xED, 0x73, 0x00, 0x00,
        0xDD, 0x22, 0x00, 0x00,
        0xED, 0x47,
        0xED, 0x4F,
    ], data);
}

#[test]
fn ld_errors() {
    assert_eq!(vec!["Z0604"], errors("ld ixh, iyl"));
    assert_eq!(vec!["Z0604"], errors("ld h, ixl"));
    assert_eq!(vec!["Z0604"], errors("ld bc, de"));
}

#[test]
fn forward_references_are_fixed_up() {
    let data = code(
        r#"
            ld hl, Table
            ld a, (ix+Offset)
            jr Done
            Done: ret
            Table: .defb 1
            Offset .equ 3
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0x21, 0x09, 0x80,
        0xDD, 0x7E, 0x03,
        0x18, 0x00,
        0xC9,
        0x01,
    ], data);
}

#[test]
fn push_and_pop() {
    let data = code(
        r#"
            push af
            push bc
            push de
            push hl
            push ix
            push iy
            pop af
            pop ix
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0xF5,
        0xC5,
        0xD5,
        0xE5,
        0xDD, 0xE5,
        0xFD, 0xE5,
        0xF1,
        0xDD, 0xE1,
    ], data);

    assert_eq!(vec!["Z0412"], errors("pop 1"));
    assert_eq!(vec!["Z0413"], errors("push (hl)"));
    assert_eq!(vec!["Z0414"], errors("push $1234"));
}

#[test]
fn ret() {
    #[rustfmt::skip]
    assert_eq!(vec![
        0xC9,
        0xC0,
        0xD8,
        0xF8,
    ], code("ret\nret nz\nret c\nret m"));
}

#[test]
fn shifts() {
    let data = code(
        r#"
            rlc b
            rrc c
            rl d
            rr e
            sla h
            sra l
            sll a
            srl (hl)
            rlc (ix+1)
            srl (iy+2), a
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0xCB, 0x00,
        0xCB, 0x09,
        0xCB, 0x12,
        0xCB, 0x1B,
        0xCB, 0x24,
        0xCB, 0x2D,
        0xCB, 0x37,
        0xCB, 0x3E,
        0xDD, 0xCB, 0x01, 0x06,
        0xFD, 0xCB, 0x02, 0x3F,
    ], data);
}

#[test]
fn next_extensions() {
    let assembled = assemble_next(
        r#"
            mul d, e
            mul
            mirror a
            nextreg $07, 2
            nextreg $07, a
            test $0F
            add hl, a
            add de, $1234
            bsla de, b
            jp (c)
            swapnib
            ldirx
            push $1234
        "#,
    );

    #[rustfmt::skip]
    assert_eq!(vec![
        0xED, 0x30,
        0xED, 0x30,
        0xED, 0x24,
        0xED, 0x91, 0x07, 0x02,
        0xED, 0x92, 0x07,
        0xED, 0x27, 0x0F,
        0xED, 0x31,
        0xED, 0x35, 0x34, 0x12,
        0xED, 0x28,
        0xED, 0x98,
        0xED, 0x23,
        0xED, 0xB4,
        0xED, 0x8A, 0x12, 0x34,
    ], bytes(&assembled));
}

#[test]
fn next_extensions_need_the_model() {
    assert_eq!(vec!["Z0414"], errors("swapnib"));
    assert_eq!(vec!["Z0414"], errors("jp (c)"));
    assert_eq!(vec!["Z0414"], errors("nextreg 1, 2"));
}

#[test]
fn next_mnemonics_name_symbols() {
    #[rustfmt::skip]
    assert_eq!(vec![
        0xCD, 0x03, 0x80,
        0xC9,
    ], code(" call Test\nTest: ret"));

    let assembled = assemble_next(" call Test\nTest: test 5\n .defw Test");

    #[rustfmt::skip]
    assert_eq!(vec![
        0xCD, 0x03, 0x80,
        0xED, 0x27, 0x05,
        0x03, 0x80,
    ], bytes(&assembled));
    assert_eq!(vec!["Z0414"], errors(" test 5"));
}
