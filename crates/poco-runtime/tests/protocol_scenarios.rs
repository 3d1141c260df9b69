// protocol_scenarios.rs — End-to-end decision rounds.
//
// Each test builds a small policy tree, feeds the engine events the way an
// instrumentation layer would, and checks outcomes, stack state and what the
// promoter was asked to do.

use std::sync::Arc;

use poco_runtime::{
    AcceptFilter, CallTarget, CompositePolicy, DecisionEngine, DecisionOutcome, EngineConfig,
    Event, InvocationFailed, NoPromotion, PolicyDocument, PromotedCall, Promoter, ProtocolState,
    Record, RecordingHalt, Sre, SrePolicy, Strategy, Value, Warehouse,
};

/// Records every call and succeeds unless told otherwise.
#[derive(Default)]
struct SpyPromoter {
    calls: Vec<PromotedCall>,
    refuse: Vec<String>,
}

impl SpyPromoter {
    fn signatures(&self) -> Vec<&str> {
        self.calls.iter().map(|c| c.signature.as_str()).collect()
    }
}

impl Promoter for SpyPromoter {
    fn invoke(
        &mut self,
        _engine: &mut DecisionEngine,
        call: &PromotedCall,
    ) -> Result<(), InvocationFailed> {
        self.calls.push(call.clone());
        if self.refuse.contains(&call.signature) {
            return Err(InvocationFailed::new(call.signature.clone(), "refused"));
        }
        Ok(())
    }
}

fn engine(sre: Sre) -> (DecisionEngine, RecordingHalt) {
    engine_over(Arc::new(Warehouse::new()), sre)
}

fn engine_over(warehouse: Arc<Warehouse>, sre: Sre) -> (DecisionEngine, RecordingHalt) {
    let halt = RecordingHalt::new();
    let mut engine = DecisionEngine::new(warehouse).with_halt_handler(halt.clone());
    engine.add_policy(SrePolicy::new("policy", sre)).unwrap();
    (engine, halt)
}

// ── Core scenarios ──

#[test]
fn permitted_action_is_allowed_and_popped() {
    let (mut engine, halt) = engine(Sre::positive("pkg.Foo.bar()"));
    let mut spy = SpyPromoter::default();

    let outcome = engine
        .query_action(&Event::action("pkg.Foo.bar()"), &mut spy)
        .unwrap();

    assert_eq!(outcome, DecisionOutcome::Allow);
    assert!(engine.pending_actions().is_empty());
    assert!(spy.calls.is_empty(), "fast path must not search for promotions");
    assert!(halt.denied().is_empty());

    let trace = engine.last_trace().unwrap();
    assert_eq!(
        trace.states(),
        vec![
            ProtocolState::Start,
            ProtocolState::MergeChildren,
            ProtocolState::PositiveFastPath
        ]
    );
}

#[test]
fn unpermitted_action_promotes_the_permitted_one() {
    let (mut engine, _) = engine(Sre::positive("pkg.Foo.baz()"));
    let mut spy = SpyPromoter::default();

    let outcome = engine
        .query_action(&Event::action("pkg.Foo.qux()"), &mut spy)
        .unwrap();

    assert_eq!(
        outcome,
        DecisionOutcome::Promoted {
            signature: "pkg.Foo.baz()".into()
        }
    );
    assert_eq!(spy.signatures(), vec!["pkg.Foo.baz()"]);
    assert!(matches!(spy.calls[0].target, CallTarget::Static));
    assert!(spy.calls[0].args.is_empty());
    assert_eq!(engine.promoted_events(), ["pkg.Foo.baz()".to_string()]);
}

#[test]
fn forbidden_action_is_denied() {
    let (mut engine, halt) = engine(Sre::negative("pkg.Foo.secret()"));

    let outcome = engine
        .query_action(&Event::action("pkg.Foo.secret()"), &mut NoPromotion)
        .unwrap();

    assert_eq!(
        outcome,
        DecisionOutcome::Denied {
            signature: "pkg.Foo.secret()".into()
        }
    );
    assert_eq!(halt.denied(), vec!["pkg.Foo.secret()"]);
    assert_eq!(halt.last_exit_code(), Some(-1));
    assert!(engine.pending_actions().is_empty());

    let trace = engine.last_trace().unwrap();
    let last = trace.steps.last().unwrap();
    assert_eq!(last.state, ProtocolState::NegativeCheck);
    assert!(last.terminal);
}

#[test]
fn unmatched_negative_opinion_allows() {
    let (mut engine, halt) = engine(Sre::negative("pkg.Foo.secret()"));
    let outcome = engine
        .query_action(&Event::action("pkg.Foo.public()"), &mut NoPromotion)
        .unwrap();
    assert_eq!(outcome, DecisionOutcome::Allow);
    assert!(halt.denied().is_empty());
    assert_eq!(engine.pending_actions(), ["pkg.Foo.public()".to_string()]);
}

// ── Ordering ──

#[test]
fn candidates_are_tried_in_lexicographic_order() {
    let (mut engine, _) = engine(Sre::or(Sre::positive("b.m()"), Sre::positive("a.m()")));
    let mut spy = SpyPromoter::default();

    let outcome = engine
        .query_action(&Event::action("pkg.Foo.qux()"), &mut spy)
        .unwrap();

    assert_eq!(
        outcome,
        DecisionOutcome::Promoted {
            signature: "a.m()".into()
        }
    );
    assert_eq!(spy.signatures(), vec!["a.m()"]);
}

#[test]
fn positive_opinion_wins_over_negative() {
    // The action is both permitted and forbidden; permission is checked first.
    let (mut engine, halt) = engine(Sre::Leaf {
        positive: Some("pkg.Foo.%()".into()),
        negative: Some("pkg.Foo.bar()".into()),
    });
    let outcome = engine
        .query_action(&Event::action("pkg.Foo.bar()"), &mut NoPromotion)
        .unwrap();
    assert_eq!(outcome, DecisionOutcome::Allow);
    assert!(halt.denied().is_empty());
}

#[test]
fn refused_promotions_fall_through_to_deny() {
    let (mut engine, halt) = engine(Sre::Leaf {
        positive: Some("pkg.Safe.run()".into()),
        negative: Some("pkg.Unsafe.run()".into()),
    });
    let mut spy = SpyPromoter {
        refuse: vec!["pkg.Safe.run()".into()],
        ..SpyPromoter::default()
    };

    let outcome = engine
        .query_action(&Event::action("pkg.Unsafe.run()"), &mut spy)
        .unwrap();

    assert_eq!(
        outcome,
        DecisionOutcome::Denied {
            signature: "pkg.Unsafe.run()".into()
        }
    );
    assert_eq!(spy.signatures(), vec!["pkg.Safe.run()"]);
    assert!(engine.promoted_events().is_empty());
    assert_eq!(halt.denied(), vec!["pkg.Unsafe.run()"]);
}

#[test]
fn same_events_give_same_outcomes() {
    let run = || {
        let (mut engine, _) = engine(Sre::or(
            Sre::or(Sre::positive("c.m()"), Sre::positive("a.m()")),
            Sre::Leaf {
                positive: Some("b.m()".into()),
                negative: Some("x.%()".into()),
            },
        ));
        let events = [
            Event::action("x.run()"),
            Event::action("a.m()"),
            Event::action("q.m()"),
            Event::action("x.stop()"),
        ];
        let mut spy = SpyPromoter {
            refuse: vec!["a.m()".into()],
            ..SpyPromoter::default()
        };
        let outcomes: Vec<DecisionOutcome> = events
            .iter()
            .map(|e| engine.query_action(e, &mut spy).unwrap())
            .collect();
        (outcomes, spy.signatures().join(" "))
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert_eq!(
        first.0[0],
        DecisionOutcome::Promoted {
            signature: "b.m()".into()
        }
    );
    assert_eq!(first.0[1], DecisionOutcome::Allow);
}

// ── Results ──

#[test]
fn permitted_result_is_kept() {
    let (mut engine, _) = engine(Sre::positive("#int{%}"));
    let outcome = engine
        .query_action(&Event::result("pkg.Counter.next()", Value::Int(5)), &mut NoPromotion)
        .unwrap();
    assert_eq!(outcome, DecisionOutcome::Allow);
    assert!(engine.pending_results().is_empty());
}

#[test]
fn unpermitted_result_is_substituted() {
    let (mut engine, _) = engine(Sre::positive("#int{0}"));
    let outcome = engine
        .query_action(&Event::result("pkg.Counter.next()", Value::Int(5)), &mut NoPromotion)
        .unwrap();
    assert_eq!(outcome, DecisionOutcome::ResultAssigned(Value::Int(0)));
    assert!(engine.pending_results().is_empty());

    let trace = engine.last_trace().unwrap();
    assert_eq!(trace.steps.last().unwrap().state, ProtocolState::ResultSearch);
}

#[test]
fn object_results_keep_identity() {
    let warehouse = Arc::new(Warehouse::new());
    let fallback = Record::new("pkg.Msg").into_handle();
    warehouse.register_object("pkg.Msg@9", fallback.clone());
    let (mut engine, _) = engine_over(Arc::clone(&warehouse), Sre::positive("#pkg.Msg{pkg.Msg@9}"));

    let actual = Record::new("pkg.Msg").into_handle();
    let event = Event::result_with_signature(
        "pkg.Inbox.next()",
        Value::Object(actual),
        "#pkg.Msg{pkg.Msg@4}",
    );
    let outcome = engine.query_action(&event, &mut NoPromotion).unwrap();
    assert_eq!(outcome, DecisionOutcome::ResultAssigned(Value::Object(fallback)));
}

#[test]
fn unresolvable_results_are_skipped() {
    let (mut engine, _) = engine(Sre::or(
        Sre::positive("#int{-x}"),
        Sre::positive("#int{7}"),
    ));
    let outcome = engine
        .query_action(&Event::result("pkg.Counter.next()", Value::Int(5)), &mut NoPromotion)
        .unwrap();
    assert_eq!(outcome, DecisionOutcome::ResultAssigned(Value::Int(7)));
}

// ── Warehouse-driven promotion ──

#[test]
fn promoted_arguments_come_from_bindings() {
    let warehouse = Arc::new(Warehouse::new());
    warehouse.bind("subject", "String", Value::Str("quarterly report".into()));
    warehouse.bind("count", "int", Value::Int(3));
    let (mut engine, _) = engine_over(
        Arc::clone(&warehouse),
        Sre::positive("pkg.mail.Log.write(#String{$subject}, #int{$count})"),
    );
    let mut spy = SpyPromoter::default();

    engine
        .query_action(&Event::action("pkg.mail.Transport.send()"), &mut spy)
        .unwrap();

    assert_eq!(spy.calls.len(), 1);
    let call = &spy.calls[0];
    assert_eq!(
        call.signature,
        "pkg.mail.Log.write(#String{quarterly report},#int{3})"
    );
    assert_eq!(
        call.args,
        vec![Some(Value::Str("quarterly report".into())), Some(Value::Int(3))]
    );
}

#[test]
fn object_calls_walk_field_paths() {
    let warehouse = Arc::new(Warehouse::new());
    let sender = Record::new("pkg.Address").into_handle();
    let message = Record::new("pkg.Message")
        .with_field("from", Value::Object(sender.clone()))
        .into_handle();
    warehouse.register_object("pkg.Message@1b6d", message);
    let (mut engine, _) = engine_over(
        Arc::clone(&warehouse),
        Sre::positive("pkg.Message@1b6d.from.validate()"),
    );
    let mut spy = SpyPromoter::default();

    let outcome = engine
        .query_action(&Event::action("pkg.mail.Transport.send()"), &mut spy)
        .unwrap();

    assert_eq!(
        outcome,
        DecisionOutcome::Promoted {
            signature: "pkg.Address.validate()".into()
        }
    );
    match &spy.calls[0].target {
        CallTarget::Object(handle) => {
            assert_eq!(Value::Object(handle.clone()), Value::Object(sender))
        }
        other => panic!("expected object target, got {:?}", other),
    }
}

#[test]
fn rebinding_takes_effect_next_round() {
    let warehouse = Arc::new(Warehouse::new());
    warehouse.bind("allowed", "String", Value::Str("pkg.A.run()".into()));
    let (mut engine, _) = engine_over(Arc::clone(&warehouse), Sre::positive("$allowed"));

    let first = engine
        .query_action(&Event::action("pkg.B.run()"), &mut NoPromotion)
        .unwrap();
    assert_eq!(first, DecisionOutcome::Allow);
    assert_eq!(engine.pending_actions(), ["pkg.B.run()".to_string()]);

    warehouse.bind("allowed", "String", Value::Str("pkg.B.run()".into()));
    let second = engine
        .query_action(&Event::action("pkg.B.run()"), &mut NoPromotion)
        .unwrap();
    assert_eq!(second, DecisionOutcome::Allow);
    assert_eq!(engine.pending_actions(), ["pkg.B.run()".to_string()]);
}

// ── Nesting ──

#[test]
fn nested_events_during_promotion_are_decided() {
    let (mut engine, _) = engine(Sre::positive("pkg.Audit.log()"));
    let mut nested = Vec::new();
    let mut promoter = |engine: &mut DecisionEngine,
                        call: &PromotedCall|
     -> Result<(), InvocationFailed> {
        // Performing the promoted call is itself intercepted.
        let outcome = engine
            .query_action(&Event::action(call.signature.clone()), &mut NoPromotion)
            .map_err(|e| InvocationFailed::new(call.signature.clone(), e.to_string()))?;
        nested.push((outcome, engine.last_trace().map(|t| t.nesting)));
        Ok(())
    };

    let outcome = engine
        .query_action(&Event::action("pkg.Foo.qux()"), &mut promoter)
        .unwrap();

    assert_eq!(
        outcome,
        DecisionOutcome::Promoted {
            signature: "pkg.Audit.log()".into()
        }
    );
    assert_eq!(nested, vec![(DecisionOutcome::Allow, Some(1))]);
    assert_eq!(engine.pending_actions(), ["pkg.Foo.qux()".to_string()]);
    assert_eq!(engine.last_trace().unwrap().nesting, 0);
}

/// Performs each promoted call by delivering it back to the engine, the way
/// an instrumented host would intercept it. Gives up after `limit` calls.
struct Redeliver {
    invocations: usize,
    limit: usize,
    nested: Vec<DecisionOutcome>,
}

impl Promoter for Redeliver {
    fn invoke(
        &mut self,
        engine: &mut DecisionEngine,
        call: &PromotedCall,
    ) -> Result<(), InvocationFailed> {
        self.invocations += 1;
        if self.invocations > self.limit {
            return Err(InvocationFailed::new(call.signature.clone(), "too many calls"));
        }
        let outcome = engine
            .query_action(&Event::action(&call.signature), self)
            .map_err(|e| InvocationFailed::new(call.signature.clone(), e.to_string()))?;
        self.nested.push(outcome);
        Ok(())
    }
}

#[test]
fn promoted_call_with_spaced_arguments_is_fast_pathed_when_performed() {
    let (mut engine, _) = engine(Sre::positive("pkg.Log.write(int, String)"));
    let mut host = Redeliver {
        invocations: 0,
        limit: 5,
        nested: Vec::new(),
    };

    let outcome = engine
        .query_action(&Event::action("pkg.Foo.qux()"), &mut host)
        .unwrap();

    assert_eq!(
        outcome,
        DecisionOutcome::Promoted {
            signature: "pkg.Log.write(int,String)".into()
        }
    );
    assert_eq!(host.invocations, 1);
    assert_eq!(host.nested, vec![DecisionOutcome::Allow]);
    assert_eq!(engine.pending_actions(), ["pkg.Foo.qux()".to_string()]);

    // The host may render the same call with its own spacing.
    let direct = engine
        .query_action(&Event::action("void pkg.Log.write(int,  String)"), &mut host)
        .unwrap();
    assert_eq!(direct, DecisionOutcome::Allow);
    assert_eq!(host.invocations, 1);
    assert_eq!(engine.pending_actions(), ["pkg.Foo.qux()".to_string()]);
}

// ── Trees ──

#[test]
fn conjunction_of_policies_narrows_permission() {
    let halt = RecordingHalt::new();
    let mut engine =
        DecisionEngine::new(Arc::new(Warehouse::new())).with_halt_handler(halt.clone());
    let tree = CompositePolicy::new("io", Strategy::Conjunction)
        .with_child(SrePolicy::new("reads", Sre::positive("java.io.%.read()")))
        .with_child(SrePolicy::new("files", Sre::positive("java.io.File.%()")));
    engine.add_policy(tree).unwrap();
    let mut spy = SpyPromoter::default();

    let allowed = engine
        .query_action(&Event::action("java.io.File.read()"), &mut spy)
        .unwrap();
    assert_eq!(allowed, DecisionOutcome::Allow);

    let other = engine
        .query_action(&Event::action("java.io.Socket.read()"), &mut spy)
        .unwrap();
    assert_eq!(other, DecisionOutcome::Allow);
    assert!(spy.calls.is_empty(), "wildcard patterns are never promoted");
    assert_eq!(engine.pending_actions(), ["java.io.Socket.read()".to_string()]);
}

#[test]
fn filtered_policies_only_see_their_events() {
    let halt = RecordingHalt::new();
    let mut engine = DecisionEngine::new(Arc::new(Warehouse::new()))
        .with_strategy(Strategy::Disjunction)
        .with_halt_handler(halt.clone());
    engine
        .add_policy(
            SrePolicy::new("files", Sre::negative("java.io.File.delete()"))
                .with_filter(AcceptFilter::signatures(&["java.io.*"]).unwrap()),
        )
        .unwrap();
    engine
        .add_policy(
            SrePolicy::new("net", Sre::negative("%"))
                .with_filter(AcceptFilter::signatures(&["java.net.*"]).unwrap()),
        )
        .unwrap();

    let outcome = engine
        .query_action(&Event::action("java.io.File.delete()"), &mut NoPromotion)
        .unwrap();
    assert!(matches!(outcome, DecisionOutcome::Denied { .. }));

    let outcome = engine
        .query_action(&Event::action("java.util.List.clear()"), &mut NoPromotion)
        .unwrap();
    assert_eq!(outcome, DecisionOutcome::Allow);

    let outcome = engine
        .query_action(&Event::action("java.net.Socket.connect()"), &mut NoPromotion)
        .unwrap();
    assert!(matches!(outcome, DecisionOutcome::Denied { .. }));
    assert_eq!(
        halt.denied(),
        vec!["java.io.File.delete()", "java.net.Socket.connect()"]
    );
}

#[test]
fn document_driven_engine() {
    let yaml = r#"
strategy: or
policies:
  - name: no-deletes
    accept: ["java.io.File.*"]
    kind: action
    sre: { type: leaf, negative: "java.io.File.delete()" }
  - name: audit
    accept: ["pkg.mail.*"]
    sre: { type: leaf, positive: "pkg.Audit.log()" }
"#;
    let halt = RecordingHalt::new();
    let config = EngineConfig::from_toml("deny_exit_code = 9").unwrap();
    let mut engine = PolicyDocument::from_yaml(yaml)
        .unwrap()
        .build_engine(Arc::new(Warehouse::new()), config)
        .unwrap()
        .with_halt_handler(halt.clone());
    let mut spy = SpyPromoter::default();

    assert!(matches!(
        engine
            .query_action(&Event::action("java.io.File.delete()"), &mut spy)
            .unwrap(),
        DecisionOutcome::Denied { .. }
    ));
    assert_eq!(halt.last_exit_code(), Some(9));

    assert_eq!(
        engine
            .query_action(&Event::action("java.io.File.exists()"), &mut spy)
            .unwrap(),
        DecisionOutcome::Allow
    );

    assert_eq!(
        engine
            .query_action(&Event::action("pkg.mail.Transport.send()"), &mut spy)
            .unwrap(),
        DecisionOutcome::Promoted {
            signature: "pkg.Audit.log()".into()
        }
    );
    assert_eq!(spy.signatures(), vec!["pkg.Audit.log()"]);

    let json = engine.last_trace().unwrap().to_json().unwrap();
    assert!(json.contains("\"promoted\""));
}

#[test]
fn config_loaded_from_file_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "record_traces = false\nstrategy = \"and\"\n").unwrap();
    let config = EngineConfig::load(&path).unwrap();

    let mut engine = DecisionEngine::with_config(Arc::new(Warehouse::new()), config);
    assert_eq!(engine.strategy(), Strategy::Conjunction);
    engine
        .query_action(&Event::action("x()"), &mut NoPromotion)
        .unwrap();
    assert!(engine.last_trace().is_none());
}
