use cellscript::core::lexer::{tokenize, LexError, Lexer, LexerOptions};
use cellscript::core::symbols::{decode, decode_name, encode, Keyword, Operator, Role, SymbolTable};
use cellscript::core::token::Token;
use cellscript::core::TokenKind;

const PROGRAM: &str = r#"
    # greet everyone in the list
    fn greet(names) {
        for n in names {
            print("hello, " + n)
        }
        return len(names) * 1.5
    }
    const who = ["ada", "grace"]
    greet(who) |> print
"#;

fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
    tokens.iter().map(|t| t.kind.clone()).collect()
}

#[test]
fn tokenizing_is_deterministic() {
    let cells = SymbolTable::standard().spell(PROGRAM);
    let first = tokenize(&cells).unwrap();
    for _ in 0..5 {
        assert_eq!(tokenize(&cells).unwrap(), first);
    }
    assert_eq!(first.last().map(|t| &t.kind), Some(&TokenKind::EndOfInput));
}

#[test]
fn raw_text_reassembles_the_source() {
    let cells = SymbolTable::standard().spell(PROGRAM);
    let tokens = tokenize(&cells).unwrap();
    let joined: String = tokens.iter().map(|t| t.raw.as_str()).collect();
    let stripped: String = cells.chars().filter(|c| !c.is_whitespace()).collect();
    assert_eq!(joined, stripped);
    for t in &tokens {
        assert_eq!(&cells[t.offset..t.offset + t.raw.len()], t.raw);
    }
}

#[test]
fn every_keyword_cell_round_trips() {
    let table = SymbolTable::standard();
    for kw in Keyword::ALL {
        let cell = table.symbol_of(Role::Keyword(kw)).unwrap();
        let tokens = tokenize(&cell.to_string()).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Keyword(kw), "{}", kw.name());
        assert_eq!(table.role_by_name(kw.name()), Some(Role::Keyword(kw)));
    }
}

#[test]
fn multi_cell_words_are_never_keywords() {
    let table = SymbolTable::standard();
    let let_cell = table.symbol_of(Role::Keyword(Keyword::Let)).unwrap();
    let fn_cell = table.symbol_of(Role::Keyword(Keyword::Fn)).unwrap();
    let word: String = [let_cell, fn_cell].iter().collect();

    let tokens = tokenize(&word).unwrap();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].kind, TokenKind::Identifier(decode_name(&word)));
}

#[test]
fn keyword_cell_words_keep_distinct_names() {
    let table = SymbolTable::standard();
    let word = |a: Keyword, b: Keyword| -> String {
        [a, b].iter().filter_map(|k| table.symbol_of(Role::Keyword(*k))).collect()
    };
    let names: Vec<TokenKind> = [
        word(Keyword::Let, Keyword::Const),
        word(Keyword::Fn, Keyword::Async),
        word(Keyword::Const, Keyword::Let),
    ]
    .iter()
    .map(|w| tokenize(w).unwrap()[0].kind.clone())
    .collect();
    assert_ne!(names[0], names[1]);
    assert_ne!(names[0], names[2]);
    assert_ne!(names[1], names[2]);
}

#[test]
fn escaped_words_are_names_even_when_spelled_like_keywords() {
    let table = SymbolTable::standard();
    let spelled = table.spell("let @let = 1");
    let tokens = tokenize(&spelled).unwrap();
    assert_eq!(
        kinds(&tokens),
        vec![
            TokenKind::Keyword(Keyword::Let),
            TokenKind::Identifier("let".into()),
            TokenKind::Operator(Operator::Assign),
            TokenKind::Number(1.0),
            TokenKind::EndOfInput,
        ]
    );
    assert!(tokens[1].raw.starts_with(table.identifier_escape));
}

#[test]
fn encode_decode_is_a_bijection_on_text() {
    for text in ["", "plain", "ünïcödé ✓", "tab\tand\nnewline", "⠁ already cells"] {
        let cells = encode(text);
        assert_eq!(cells.chars().count(), text.len());
        assert_eq!(decode(&cells), text);
    }
}

#[test]
fn strings_and_comments_decode_their_content() {
    let cells = SymbolTable::standard().spell("print(\"a \\\"quoted\\\" word\") # trailing note");
    let tokens = tokenize(&cells).unwrap();
    let ks = kinds(&tokens);
    assert!(ks.contains(&TokenKind::String("a \"quoted\" word".into())));
    assert!(ks.contains(&TokenKind::Comment("trailing note".into())));
}

#[test]
fn unterminated_string_depends_on_leniency() {
    let table = SymbolTable::standard();
    let mut src = String::from(table.string_delimiter);
    src.push_str(&encode("never closed"));

    assert!(matches!(tokenize(&src), Err(LexError::UnterminatedString(1, 1))));

    let lenient = LexerOptions {
        lenient_literals: true,
    };
    let tokens = Lexer::with_options(&src, lenient).tokenize().unwrap();
    assert_eq!(tokens[0].kind, TokenKind::String("never closed".into()));
}

#[test]
fn characters_outside_the_alphabet_are_rejected() {
    match tokenize("⠁ x") {
        Err(LexError::UnexpectedCharacter('x', 1, 3)) => {}
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn numbers_keep_their_decimal_part() {
    let cells = SymbolTable::standard().spell("3.25 10 0.5");
    let numbers: Vec<f64> = tokenize(&cells)
        .unwrap()
        .into_iter()
        .filter_map(|t| match t.kind {
            TokenKind::Number(n) => Some(n),
            _ => None,
        })
        .collect();
    assert_eq!(numbers, vec![3.25, 10.0, 0.5]);
}
