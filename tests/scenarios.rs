#![expect(clippy::unwrap_used)] // test code OK

use pretty_assertions::assert_eq;
use sexpeval::ast::{Value, nil, sym, val};
use sexpeval::evaluator::{Environment, apply, create_global_env, eval};
use sexpeval::reader::parse;
use sexpeval::{EVAL_STACK_SIZE, Error, ErrorKind, MAX_EVAL_DEPTH, evaluate_source};

/// Evaluate each line in order in one environment, returning the last result.
fn run_session(env: &Environment, lines: &[&str]) -> Result<Value, Error> {
    let mut last = Value::Nil;
    for line in lines {
        last = evaluate_source(line, env)?;
    }
    Ok(last)
}

#[test]
fn arithmetic_and_recursion_scenarios() {
    let env = create_global_env();

    assert_eq!(evaluate_source("(+ 2 3)", &env).unwrap(), val(5));
    assert_eq!(
        evaluate_source(
            "(define fact (lambda (x) (if (<= x 2) x (* x (fact (- x 1))))))",
            &env
        )
        .unwrap(),
        sym("fact")
    );
    assert_eq!(evaluate_source("(fact 6)", &env).unwrap(), val(720));
    assert_eq!(
        evaluate_source("(map (lambda (x y) (* x y)) '(1 2 3) '(9 20 7))", &env).unwrap(),
        val([9, 40, 21])
    );
    assert_eq!(
        evaluate_source("(let ((x 22) (y 11)) (* x y))", &env).unwrap(),
        val(242)
    );
    assert_eq!(
        evaluate_source("(cond ((> 1 2) 10) ((< 1 2) 14))", &env).unwrap(),
        val(14)
    );
}

#[test]
fn standard_procedures_are_available() {
    let env = create_global_env();
    assert_eq!(evaluate_source("(fact 5)", &env).unwrap(), val(120));
    assert_eq!(evaluate_source("(fib 12)", &env).unwrap(), val(144));
    assert_eq!(
        evaluate_source("(map fib (seq 8))", &env).unwrap(),
        val([0, 1, 1, 2, 3, 5, 8, 13])
    );
}

#[test]
fn quoting_identity() {
    let env = create_global_env();
    let expected = val(vec![sym("a"), sym("b"), sym("c")]);
    assert_eq!(evaluate_source("'(a b c)", &env).unwrap(), expected);
    assert_eq!(evaluate_source("(quote (a b c))", &env).unwrap(), expected);
    assert_eq!(parse("'(a b c)").unwrap(), parse("(quote (a b c))").unwrap());
}

#[test]
fn lexical_scoping() {
    let env = create_global_env();
    evaluate_source("(define x 10)", &env).unwrap();
    assert_eq!(evaluate_source("(let ((x 22)) x)", &env).unwrap(), val(22));
    assert_eq!(evaluate_source("x", &env).unwrap(), val(10));
}

#[test]
fn closure_capture_is_lexical() {
    let env = create_global_env();
    let result = run_session(
        &env,
        &[
            "(define f (let ((x 10)) (lambda (y) (^ x y))))",
            "(define x 3)",
            "(f 1)",
        ],
    )
    .unwrap();
    assert_eq!(result, val(10));
}

#[test]
fn closures_observe_set_on_captured_variables() {
    let env = create_global_env();
    let result = run_session(
        &env,
        &[
            "(define x 1)",
            "(define get-x (lambda () x))",
            "(set x 99)",
            "(get-x)",
        ],
    )
    .unwrap();
    assert_eq!(result, val(99));

    let result = run_session(
        &env,
        &[
            "(define make-acc (lambda (total) (lambda (n) (set total (+ total n)))))",
            "(define acc (make-acc 100))",
            "(acc 10)",
            "(acc 5)",
        ],
    )
    .unwrap();
    assert_eq!(result, val(115));
}

#[test]
fn truthiness_of_logic_forms() {
    let env = create_global_env();
    let cases = [
        ("(and True None)", nil()),
        ("(or None)", nil()),
        ("(and)", val(true)),
        ("(or)", nil()),
        ("(or None 0)", val(0)),
        ("(if 0 'yes 'no)", sym("yes")),
        ("(if None 'yes 'no)", sym("no")),
        ("(> 1 2)", nil()),
    ];
    for (source, expected) in cases {
        assert_eq!(evaluate_source(source, &env).unwrap(), expected, "{source}");
    }
}

#[test]
fn redefinition_and_undefined_errors() {
    let env = create_global_env();
    evaluate_source("(define p 1)", &env).unwrap();

    let err = evaluate_source("(define p 2)", &env).unwrap_err();
    assert_eq!(err, Error::AlreadyDefined("p".into()));
    assert_eq!(err.to_string(), "Symbol already defined in this scope: p");

    let err = evaluate_source("(let ((p 1)) (define p 2))", &env).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyDefined);
    assert_eq!(evaluate_source("(let ((p 3)) p)", &env).unwrap(), val(3));

    let err = evaluate_source("nope", &env).unwrap_err();
    assert_eq!(err, Error::UndefinedSymbol("nope".into()));
    let err = evaluate_source("(set nope 1)", &env).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedSymbol);
    // A failed set never creates a binding
    assert!(evaluate_source("nope", &env).is_err());
}

#[test]
fn syntax_errors() {
    let env = create_global_env();
    for source in ["", "(+ 1 2", ")", "(+ 1 2) 3", "\"unterminated"] {
        let err = evaluate_source(source, &env).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError, "{source:?}: {err}");
    }
}

#[test]
fn hash_tables_are_shared_by_reference() {
    let env = create_global_env();
    let result = run_session(
        &env,
        &[
            "(define h (make-hash-table))",
            "(define store (lambda (table k v) (set (gethash k table) v)))",
            "(store h 'color \"red\")",
            "(store h 2 'two)",
            "(gethash 'color h)",
        ],
    )
    .unwrap();
    assert_eq!(result, val("red"));
    assert_eq!(evaluate_source("(gethash 2.0 h)", &env).unwrap(), sym("two"));
    assert_eq!(evaluate_source("(hash-table-count h)", &env).unwrap(), val(2));
    assert_eq!(evaluate_source("h", &env).unwrap().to_string(), "#<hash-table:2>");
}

#[test]
fn display_renders_lisp_syntax() {
    let env = create_global_env();
    let cases = [
        ("nil", "nil"),
        ("True", "True"),
        ("(/ 4.0 2)", "2.0"),
        ("\"a b\"", "\"a b\""),
        ("'(a (b 1) 2.5)", "(a (b 1) 2.5)"),
        ("(lambda (x y) x)", "#<lambda (x y)>"),
        ("car", "#<builtin:car>"),
        ("(define q 1)", "q"),
    ];
    for (source, expected) in cases {
        assert_eq!(
            evaluate_source(source, &env).unwrap().to_string(),
            expected,
            "{source}"
        );
    }
}

#[test]
fn host_can_apply_procedures() {
    let env = create_global_env();
    let adder = evaluate_source("(lambda (a b) (+ a b))", &env).unwrap();
    assert_eq!(apply(&adder, vec![val(2), val(40)]).unwrap(), val(42));

    let expr = parse("(list 1 2)").unwrap();
    assert_eq!(eval(&expr, &env).unwrap(), val([1, 2]));
}

/// Run `session` on a thread with enough stack for the full evaluation depth.
fn with_eval_stack<T: Send + 'static>(session: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(EVAL_STACK_SIZE)
        .spawn(session)
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn runaway_recursion_reports_eval_limit() {
    let err = with_eval_stack(|| {
        let env = create_global_env();
        evaluate_source("(define loop (lambda (n) (+ 1 (loop n))))", &env).unwrap();
        evaluate_source("(loop 0)", &env).unwrap_err()
    });
    assert_eq!(err, Error::EvalLimit(MAX_EVAL_DEPTH));
}

#[test]
fn deep_user_recursion_succeeds() {
    with_eval_stack(|| {
        let env = create_global_env();
        let length = run_session(
            &env,
            &[
                "(define countdown (lambda (n) (if (<= n 0) (list) (cons n (countdown (- n 1))))))",
                "(length (countdown 250))",
            ],
        );
        let total = run_session(
            &env,
            &[
                "(define sum (lambda (n) (if (<= n 0) 0 (+ n (sum (- n 1))))))",
                "(sum 300)",
            ],
        );
        assert_eq!(length.unwrap(), val(250));
        assert_eq!(total.unwrap(), val(45150));
    });
}

#[test]
fn evaluation_leaves_code_untouched() {
    let env = create_global_env();
    let definition_source =
        "(define walk (lambda (xs) (let ((n 0)) (map (lambda (x) (set n (+ n x))) xs) n)))";
    let call_source = "(walk '(1 2 3))";
    let body_source = "(let ((n 0)) (map (lambda (x) (set n (+ n x))) xs) n)";

    let definition = parse(definition_source).unwrap();
    let call = parse(call_source).unwrap();

    eval(&definition, &env).unwrap();
    assert_eq!(eval(&call, &env).unwrap(), val(6));
    assert_eq!(eval(&call, &env).unwrap(), val(6));

    assert_eq!(definition, parse(definition_source).unwrap());
    assert_eq!(call, parse(call_source).unwrap());

    let Value::Closure(closure) = env.lookup("walk").unwrap() else {
        panic!("walk should be bound to a closure");
    };
    assert_eq!(closure.body, parse(body_source).unwrap());
}
