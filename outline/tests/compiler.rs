use outline::Program;
use outline::instruction::value::{BinaryOperator, Value};
use outline::instruction::{Instruction, Statement};
use outline::parser::{Compiler, ParseError};
use outline::tags::{TagDef, TagTable, TrimPolicy};

fn compile(source: &str) -> Result<Program, ParseError> {
    let tags = TagTable::default();
    Compiler::new(&tags).compile(source, 0)
}

fn instructions(source: &str) -> Vec<Instruction> {
    compile(source)
        .unwrap_or_else(|e| panic!("compile failed for {:?}: {}", source, e))
        .instructions
}

fn emitted(source: &str) -> Value {
    match instructions(source).as_slice() {
        [Instruction::Emit { value, .. }] => value.clone(),
        other => panic!("expected a single emit, got {:?}", other),
    }
}

fn statements(source: &str) -> Vec<Statement> {
    match instructions(source).as_slice() {
        [Instruction::Execute { statements, .. }] => statements.clone(),
        other => panic!("expected a single statement tag, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Segmenting
// ---------------------------------------------------------------------------

#[test]
fn plain_text_is_static() {
    let program = compile("no tags here, just **markup**").unwrap();
    assert!(program.is_static());
    assert_eq!(
        program.instructions,
        vec![Instruction::Literal("no tags here, just **markup**".into())]
    );
}

#[test]
fn expression_tag_between_text() {
    assert_eq!(
        instructions("a ``x`` b"),
        vec![
            Instruction::Literal("a ".into()),
            Instruction::Emit {
                value: Value::VariableReference("x".into(), 4..5),
                filter: true,
                span: 2..7,
            },
            Instruction::Literal(" b".into()),
        ]
    );
}

#[test]
fn statement_tags_trim_what_follows() {
    let program = instructions("``{ x = 1 }``\nnext");
    assert!(matches!(program[0], Instruction::Execute { .. }));
    assert_eq!(program[1], Instruction::Literal("next".into()));

    let program = instructions("``{ x = 1 }``\n\nnext");
    assert_eq!(program[1], Instruction::Literal("\nnext".into()));

    let program = instructions("``{_ x = 1 }``\n\n   next");
    assert_eq!(program[1], Instruction::Literal("next".into()));
}

#[test]
fn plain_tags_classify_their_body() {
    assert!(matches!(
        instructions("``let y = 2``")[..],
        [Instruction::Execute { .. }]
    ));
    assert!(matches!(
        instructions("``y = 2``")[..],
        [Instruction::Execute { .. }]
    ));
    assert!(matches!(
        instructions("``y == 2``")[..],
        [Instruction::Emit { .. }]
    ));
    assert!(matches!(
        instructions("``if a { b = 1 }``")[..],
        [Instruction::Execute { .. }]
    ));
}

#[test]
fn statement_tags_may_span_lines() {
    let body = statements("``{\n  a = 1\n  b = a + 1\n}``");
    assert_eq!(body.len(), 2);
}

#[test]
fn plain_statement_tags_may_span_lines() {
    let body = statements("``let x =\n  1 + 2``");
    assert!(matches!(&body[..], [Statement::Assignment { declare: true, .. }]));

    let body = statements("``if a {\n  b = 1\n}``");
    assert!(matches!(&body[..], [Statement::If { .. }]));
}

#[test]
fn multiline_expression_is_not_a_tag() {
    let tags = TagTable::empty().with(TagDef::new("<<", ">>"));
    let program = Compiler::new(&tags).compile("<<a\nb>> <<c>>", 0).unwrap();
    assert_eq!(
        program.instructions,
        vec![
            Instruction::Literal("<<a\nb>> ".into()),
            Instruction::Emit {
                value: Value::VariableReference("c".into(), 10..11),
                filter: false,
                span: 8..13,
            },
        ]
    );

    // the retry leaves the closing marker to open a tag of its own
    let err = compile("``a +\nb``").unwrap_err();
    assert!(err.message.contains("unterminated tag"), "{}", err.message);
    assert_eq!((err.line, err.column), (2, 2));
}

#[test]
fn close_marker_inside_a_string() {
    assert_eq!(emitted("``'a``b'``"), Value::StringLiteral("a``b".into()));
    assert_eq!(emitted("``\"}``\"``"), Value::StringLiteral("}``".into()));
}

#[test]
fn close_marker_inside_a_comment() {
    let body = statements("``{ x = 1 /* }`` */ }``");
    assert_eq!(body.len(), 1);
}

// ---------------------------------------------------------------------------
// Rewrites
// ---------------------------------------------------------------------------

fn call_parts(value: &Value) -> (Option<String>, Vec<Value>) {
    match value {
        Value::Call { callee, args, .. } => (callee.path(), args.clone()),
        other => panic!("expected a call, got {:?}", other),
    }
}

#[test]
fn reference_tags_become_ref_calls() {
    let (callee, args) = call_parts(&emitted("``[[My Page]]``"));
    assert_eq!(callee.as_deref(), Some("ref"));
    assert_eq!(args, vec![Value::StringLiteral("[[My Page]]".into())]);

    let (callee, args) = call_parts(&emitted("``((abc-123))``"));
    assert_eq!(callee.as_deref(), Some("ref"));
    assert_eq!(args, vec![Value::StringLiteral("((abc-123))".into())]);
}

#[test]
fn reference_bodies_are_not_scripts() {
    let (_, args) = call_parts(&emitted("``[[Don't panic]]``"));
    assert_eq!(args, vec![Value::StringLiteral("[[Don't panic]]".into())]);
}

#[test]
fn date_tags_become_nlp_calls() {
    let (callee, args) = call_parts(&emitted("``@next friday``"));
    assert_eq!(callee.as_deref(), Some("date.nlp"));
    assert_eq!(args, vec![Value::StringLiteral("next friday".into())]);
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn binary(value: &Value) -> (BinaryOperator, &Value, &Value) {
    match value {
        Value::BinaryOperation {
            operator,
            left,
            right,
        } => (*operator, left, right),
        other => panic!("expected a binary operation, got {:?}", other),
    }
}

#[test]
fn multiplication_binds_tighter() {
    let value = emitted("``1 + 2 * 3``");
    let (op, left, right) = binary(&value);
    assert_eq!(op, BinaryOperator::Addition);
    assert_eq!(*left, Value::NumberLiteral(1.0));
    assert_eq!(binary(right).0, BinaryOperator::Multiplication);
}

#[test]
fn coalesce_binds_looser_than_or() {
    let value = emitted("``a ?? b || c``");
    let (op, _, right) = binary(&value);
    assert_eq!(op, BinaryOperator::Coalesce);
    assert_eq!(binary(right).0, BinaryOperator::LogicalOr);
}

#[test]
fn member_calls_and_indexes() {
    let value = emitted("``date.nlp('today').day``");
    match value {
        Value::Member { object, field, .. } => {
            assert_eq!(field, "day");
            assert_eq!(call_parts(&object).0.as_deref(), Some("date.nlp"));
        }
        other => panic!("expected a member, got {:?}", other),
    }
    assert!(matches!(emitted("``list[0]``"), Value::Index { .. }));
}

#[test]
fn template_literals_interpolate() {
    assert!(matches!(emitted("```a ${b}` ``"), Value::Interpolation(_)));
    assert_eq!(emitted("```plain` ``"), Value::StringLiteral("plain".into()));
}

#[test]
fn ternary() {
    assert!(matches!(
        emitted("``ok ? 'yes' : 'no'``"),
        Value::Conditional { .. }
    ));
}

#[test]
fn else_if_chains() {
    let body = statements("``{ if a { b = 1 } else if c { b = 2 } else { b = 3 } }``");
    let [Statement::If { else_branch, .. }] = body.as_slice() else {
        panic!("expected one if, got {:?}", body);
    };
    let [Statement::If { else_branch: last, .. }] = else_branch.as_slice() else {
        panic!("expected a nested if, got {:?}", else_branch);
    };
    assert_eq!(last.len(), 1);
}

#[test]
fn let_declares() {
    let body = statements("``{ let x = 1; y = 2 }``");
    assert!(matches!(
        &body[..],
        [
            Statement::Assignment { declare: true, .. },
            Statement::Assignment { declare: false, .. }
        ]
    ));
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn unterminated_tag_is_located() {
    let err = compile("line one\n``1 + 2").unwrap_err();
    assert!(err.message.contains("unterminated tag"), "{}", err.message);
    assert_eq!((err.line, err.column), (2, 1));
}

#[test]
fn unterminated_string_is_located() {
    let err = compile("ab ``'oops``").unwrap_err();
    assert_eq!(err.message, "unterminated string literal");
    assert_eq!((err.line, err.column), (1, 6));
}

#[test]
fn syntax_errors_name_their_tag() {
    let err = compile("text\n``{ x = }``").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(
        err.notes.iter().any(|n| n == "in tag on line 2: ``{ x = }``"),
        "{:?}",
        err.notes
    );
}

#[test]
fn display_includes_the_location() {
    let err = compile("``1 +``").unwrap_err();
    assert_eq!(err.line, 1);
    assert_eq!(
        err.to_string(),
        format!("{} at 1:{}", err.message, err.column)
    );
}

// ---------------------------------------------------------------------------
// Tag tables and listings
// ---------------------------------------------------------------------------

#[test]
fn custom_tag_table() {
    let tags = TagTable::empty()
        .with(TagDef::new("{%", "%}").trim(TrimPolicy::OneNewline).classify(|_| {
            outline::tags::TagClass::STATEMENT
        }))
        .with(TagDef::new("{{", "}}").auto_filter(true));
    let program = Compiler::new(&tags)
        .compile("{% n = 2 %}\nHi {{ n }}", 0)
        .unwrap();
    assert!(matches!(
        &program.instructions[..],
        [
            Instruction::Execute { .. },
            Instruction::Literal(text),
            Instruction::Emit { filter: true, .. },
        ] if text == "Hi "
    ));
}

#[test]
fn empty_tag_table_leaves_text_alone() {
    let tags = TagTable::empty();
    let program = Compiler::new(&tags).compile("``x``", 0).unwrap();
    assert_eq!(program.instructions, vec![Instruction::Literal("``x``".into())]);
}

#[test]
fn listing_names_lines_and_kinds() {
    let source = "a ``x``\n``{ y = 1 }``";
    let listing = compile(source).unwrap().listing(source);
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("text \"a \""));
    assert!(lines[1].contains("L1") && lines[1].ends_with("emit|pretty ``x``"));
    assert!(lines[2].contains("text \"\\n\""));
    assert!(lines[3].contains("L2") && lines[3].ends_with("exec ``{ y = 1 }``"));
}
