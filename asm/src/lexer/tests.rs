use super::*;

const FILE: FileId = FileId(0);

fn kinds(text: &str) -> Vec<TokenKind> {
    Lexer::new(FILE, 1, text)
        .map(|token| token.map(|token| token.kind))
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn error(text: &str) -> LexerError {
    Lexer::new(FILE, 1, text)
        .find_map(|token| token.err())
        .unwrap()
}

#[test]
fn comments() {
    assert!(kinds("   ; comment").is_empty());
    assert!(kinds("// comment").is_empty());
    assert_eq!(vec![TokenKind::Mnemonic(Mnemonic::Nop)], kinds("/* a */ nop /* b"));
}

#[test]
fn string() {
    assert_eq!(vec![TokenKind::Str("test".into())], kinds(r#""test""#));
}

#[test]
fn string_escapes() {
    assert_eq!(
        vec![TokenKind::Str("a\n\t\"\\\x7f".into())],
        kinds(r#""a\n\t\"\\\x7f""#)
    );
    assert!(matches!(
        error(r#""\q""#),
        LexerError::UnrecognizedStringEscape { escape, .. } if escape == "\\q"
    ));
    assert!(matches!(error(r#""open"#), LexerError::UnterminatedString { .. }));
}

#[test]
fn chars() {
    assert_eq!(vec![TokenKind::Number(0x41)], kinds("'A'"));
    assert_eq!(vec![TokenKind::Number(0x0A)], kinds(r"'\n'"));
    assert!(matches!(error("'AB'"), LexerError::MalformedChar { .. }));
}

#[test]
fn numbers() {
    assert_eq!(
        vec![
            TokenKind::Number(123),
            TokenKind::Number(0x1F),
            TokenKind::Number(0xCAFE),
            TokenKind::Number(0xBEEF),
            TokenKind::Number(0xFF),
            TokenKind::Number(0b0101),
            TokenKind::Number(0b110),
            TokenKind::Number(0b11),
            TokenKind::Number(0o17),
            TokenKind::Number(0o7),
            TokenKind::Number(0x12),
        ],
        kinds("123 0x1F $CAFE #BEEF 0FFh %0101 0b110 11b 17q 7o 1_2h")
    );
    assert!(matches!(error("12g"), LexerError::MalformedNumber { .. }));
}

#[test]
fn reals() {
    assert_eq!(
        vec![
            TokenKind::Real(3.25),
            TokenKind::Real(2e8),
            TokenKind::Real(1.5e-2),
            TokenKind::Real(4e3),
        ],
        kinds("3.25 2e8 1.5e-2 4E+3")
    );
    assert_eq!(
        vec![
            TokenKind::Number(0x1E3),
            TokenKind::Punct(Punct::Minus),
            TokenKind::Number(1),
        ],
        kinds("1e3h-1")
    );
    assert!(matches!(error("1.5x"), LexerError::MalformedNumber { .. }));
}

#[test]
fn dollar_forms() {
    assert_eq!(
        vec![
            TokenKind::CurrentAddress,
            TokenKind::LoopCounter,
            TokenKind::LoopCounter,
            TokenKind::Number(0x10),
        ],
        kinds("$ $cnt .cnt $10")
    );
}

#[test]
fn percent_is_modulo_when_not_binary() {
    assert_eq!(
        vec![
            TokenKind::Identifier,
            TokenKind::Punct(Punct::Mod),
            TokenKind::Number(3),
        ],
        kinds("size % 3")
    );
}

#[test]
fn identifiers_and_keywords() {
    assert_eq!(
        vec![
            TokenKind::Mnemonic(Mnemonic::Ld),
            TokenKind::Register(Register::A),
            TokenKind::Punct(Punct::Comma),
            TokenKind::Identifier,
        ],
        kinds("LD a,Module.Label_1")
    );
    assert_eq!(
        vec![
            TokenKind::Mnemonic(Mnemonic::Ex),
            TokenKind::Register(Register::Af),
            TokenKind::Punct(Punct::Comma),
            TokenKind::Register(Register::AfPrime),
        ],
        kinds("ex af,af'")
    );
    assert_eq!(
        vec![TokenKind::Condition(Condition::Nz), TokenKind::Register(Register::C)],
        kinds("nz c")
    );
    assert_eq!(vec![TokenKind::Bool(true), TokenKind::Bool(false)], kinds("true FALSE"));
}

#[test]
fn temporary_labels() {
    assert_eq!(vec![TokenKind::Identifier], kinds("`x"));
    assert_eq!(
        vec![
            TokenKind::Identifier,
            TokenKind::Punct(Punct::Colon),
            TokenKind::Mnemonic(Mnemonic::Jr),
            TokenKind::Identifier,
        ],
        kinds("`skip: jr `skip")
    );
    let tokens: Vec<_> = Lexer::new(FILE, 1, "jr `skip")
        .map(|token| token.unwrap().text)
        .collect();
    assert_eq!(vec!["jr", "`skip"], tokens);
    assert!(matches!(error("`"), LexerError::UnrecognizedInput { .. }));
    assert!(matches!(error("ld a,`"), LexerError::UnrecognizedInput { .. }));
}

#[test]
fn dotted_keywords() {
    assert_eq!(
        vec![
            TokenKind::Pragma(PragmaName::Defb),
            TokenKind::Statement(StatementName::Macro),
            TokenKind::Statement(StatementName::EndModule),
        ],
        kinds(".db .MACRO .scopeend")
    );
    assert!(matches!(
        error(".bogus"),
        LexerError::UnrecognizedInput { value, .. } if value == ".bogus"
    ));
}

#[test]
fn bare_statements() {
    assert_eq!(
        vec![
            TokenKind::Statement(StatementName::Endm),
            TokenKind::Statement(StatementName::Loop),
            TokenKind::Identifier,
            TokenKind::Pragma(PragmaName::Org),
        ],
        kinds("endm loop macro org")
    );
}

#[test]
fn directives() {
    assert_eq!(
        vec![
            TokenKind::Directive(DirectiveName::Include),
            TokenKind::Str("a.z80asm".into()),
        ],
        kinds(r#"#include "a.z80asm""#)
    );
    assert!(matches!(error("#bogus"), LexerError::UnrecognizedInput { .. }));
}

#[test]
fn macro_params() {
    assert_eq!(
        vec![
            TokenKind::Mnemonic(Mnemonic::Ld),
            TokenKind::MacroParam("arg1".into()),
            TokenKind::Punct(Punct::Comma),
            TokenKind::MacroParam("arg2".into()),
        ],
        kinds("ld {{arg1}},{{ arg2 }}")
    );
    assert_eq!(vec![TokenKind::Punct(Punct::DoubleBraceOpen)], kinds("{{"));
}

#[test]
fn punctuation() {
    assert_eq!(
        vec![
            TokenKind::Punct(Punct::Tilde),
            TokenKind::Punct(Punct::Bang),
            TokenKind::Punct(Punct::Caret),
            TokenKind::Punct(Punct::Ampersand),
            TokenKind::Punct(Punct::DoubleAmpersand),
            TokenKind::Punct(Punct::Star),
            TokenKind::Punct(Punct::ParenOpen),
            TokenKind::Punct(Punct::ParenClose),
            TokenKind::Punct(Punct::Minus),
            TokenKind::Punct(Punct::Equal),
            TokenKind::Punct(Punct::Plus),
            TokenKind::Punct(Punct::Pipe),
            TokenKind::Punct(Punct::DoublePipe),
            TokenKind::Punct(Punct::Colon),
            TokenKind::Punct(Punct::DoubleColon),
            TokenKind::Punct(Punct::Assign),
            TokenKind::Punct(Punct::LessEqual),
            TokenKind::Punct(Punct::GreaterEqual),
            TokenKind::Punct(Punct::ShiftLeft),
            TokenKind::Punct(Punct::ShiftRight),
            TokenKind::Punct(Punct::DoubleEqual),
            TokenKind::Punct(Punct::NotEqual),
            TokenKind::Punct(Punct::Div),
            TokenKind::Punct(Punct::Question),
        ],
        kinds("~ ! ^ & && * ( ) - = + | || : :: := <= >= << >> == != / ?")
    );
}

#[test]
fn spans_and_columns() {
    let mut stream = TokenStream::tokenize(FILE, 3, "  ld a, 12").unwrap();
    let first = stream.next();
    assert_eq!(SourceLoc::new(FILE, 3, 3), first.loc);
    assert_eq!((2, 4), (first.start, first.end));
    assert_eq!(&TokenKind::Register(Register::A), &stream.peek().kind);
    assert_eq!(&TokenKind::Number(12), &stream.ahead(2).kind);
    stream.rewind(4);
    assert!(stream.is_eol());
    assert!(stream.next().is_eol());
    assert_eq!(10, stream.consumed_end());
}
