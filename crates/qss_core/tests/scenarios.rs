use qss_core::{
    Method, Recorder, RecorderSettings, RunObserver, Simulation, SineInput, SolverSettings, VarId,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const METHODS: [Method; 5] = [
    Method::Qss1,
    Method::Qss2,
    Method::Qss3,
    Method::Liqss1,
    Method::Liqss2,
];

fn settings(end_time: f64) -> SolverSettings {
    SolverSettings::default().with_end_time(end_time)
}

/// Records every event instant and its triggers.
#[derive(Default)]
struct TriggerLog {
    events: Vec<(f64, Vec<VarId>)>,
    started: bool,
    finished: bool,
}

impl RunObserver for TriggerLog {
    fn on_start(&mut self, _sim: &Simulation) {
        self.started = true;
    }

    fn on_requantize(&mut self, _sim: &Simulation, t: f64, triggers: &[VarId]) {
        self.events.push((t, triggers.to_vec()));
    }

    fn on_finish(&mut self, _sim: &Simulation) {
        self.finished = true;
    }
}

fn decay(method: Method, tol: f64, end_time: f64) -> (Simulation, VarId) {
    let mut sim = Simulation::new(settings(end_time));
    let x = sim
        .add_variable("x", method, tol, tol, 1.0)
        .expect("variable");
    sim.derivative_mut(x).expect("derivative").add(-1.0, x);
    (sim, x)
}

#[test]
fn qss2_exponential_decay_tracks_analytic_solution() {
    init_logger();
    let mut sim = Simulation::new(SolverSettings {
        end_time: 10.0,
        diagnostics: true,
        ..SolverSettings::default()
    });
    let x = sim
        .add_variable("x", Method::Qss2, 1e-4, 1e-4, 1.0)
        .expect("variable");
    sim.derivative_mut(x).expect("derivative").add(-1.0, x);
    sim.initialize().expect("initialize");
    assert!(sim.variable(x).self_observer());

    let mut steps = 0;
    while let Some(triggers) = sim.step().expect("step") {
        assert_eq!(triggers, vec![x]);
        let var = sim.variable(x);
        let t = var.t_q();
        assert!(t <= 10.0);
        assert!(
            (var.q(t) - (-t).exp()).abs() <= var.q_tol(),
            "q({t}) = {} drifted from e^-t",
            var.q(t)
        );
        assert_eq!(var.q_tol(), 1e-4f64.max(1e-4 * var.centre().abs()));
        assert!(var.q_tol() > 0.0);
        steps += 1;
    }
    assert!(steps > 10);
    assert_eq!(sim.stats().requantizations, steps);
    assert_eq!(sim.stats().simultaneous_events, 0);
}

#[test]
fn qss2_decay_samples_stay_accurate() {
    let (mut sim, x) = decay(Method::Qss2, 1e-4, 10.0);
    let mut recorder = Recorder::new(RecorderSettings {
        sample_step: Some(0.1),
        all_variables: false,
    });
    sim.run(&mut recorder).expect("run");
    // |x| <= 1 keeps qTol at the absolute tolerance for the whole run.
    let q_tol = sim.variable(x).q_tol();
    assert_eq!(q_tol, 1e-4);

    let trace = recorder.trace("x").expect("trace");
    assert!(trace.q.len() > 100);
    for (q, x) in trace.q.iter().zip(&trace.x) {
        let exact = (-q.time).exp();
        assert!((q.value - exact).abs() <= q_tol, "q sample {q} vs {exact}");
        assert!((x.value - exact).abs() <= q_tol, "x sample {x} vs {exact}");
    }
    let last = trace.q.last().expect("closing sample");
    assert_eq!(last.time, 10.0);
}

#[test]
fn qss3_and_liqss2_decay_stay_accurate() {
    for method in [Method::Qss3, Method::Liqss2] {
        let (mut sim, _) = decay(method, 1e-4, 10.0);
        let mut recorder = Recorder::new(RecorderSettings {
            sample_step: Some(0.25),
            all_variables: true,
        });
        sim.run(&mut recorder).expect("run");
        for sample in &recorder.trace("x").expect("trace").x {
            let exact = (-sample.time).exp();
            assert!(
                (sample.value - exact).abs() <= 1e-3,
                "{method}: x({}) = {} vs {exact}",
                sample.time,
                sample.value
            );
        }
    }
}

#[test]
fn constant_derivative_is_linear_for_every_method() {
    for method in METHODS {
        let mut sim = Simulation::new(settings(1.0));
        let x = sim
            .add_variable("x", method, 1e-3, 0.0, 1.0)
            .expect("variable");
        sim.derivative_mut(x).expect("derivative").add_constant(3.0);
        sim.initialize().expect("initialize");

        let var = sim.variable(x);
        assert!(!var.self_observer());
        if method.order() == 1 {
            assert!((var.t_e() - 1e-3 / 3.0).abs() < 1e-15, "{method}");
        } else {
            assert_eq!(var.t_e(), f64::INFINITY, "{method}");
        }

        let mut recorder = Recorder::new(RecorderSettings {
            sample_step: Some(0.01),
            all_variables: false,
        });
        sim.run(&mut recorder).expect("run");
        let trace = recorder.trace("x").expect("trace");
        for sample in &trace.x {
            let exact = 1.0 + 3.0 * sample.time;
            assert!((sample.value - exact).abs() < 1e-9, "{method}: {sample}");
        }
        for sample in &trace.q {
            let exact = 1.0 + 3.0 * sample.time;
            assert!(
                (sample.value - exact).abs() <= 1e-3 + 1e-9,
                "{method}: {sample}"
            );
        }
    }
}

#[test]
fn qss2_initial_coefficients_match_hand_computation() {
    let mut sim = Simulation::new(settings(1.0));
    let x = sim
        .add_variable("x", Method::Qss2, 1e-6, 1e-4, 2.5)
        .expect("variable");
    sim.derivative_mut(x)
        .expect("derivative")
        .add_constant(12.0)
        .add(2.0, x);
    sim.initialize().expect("initialize");

    let var = sim.variable(x);
    assert_eq!(var.quantized_coefficients(), &[2.5, 17.0]);
    assert_eq!(var.continuous_coefficients(), &[2.5, 17.0, 17.0]);
    let expected = 2.5 + 17.0e-6 + 17.0e-12;
    assert!((var.x(1.0e-6) - expected).abs() < 1e-14);
    let q_tol = 1e-6f64.max(2.5 * 1e-4);
    let expected_t_e = (q_tol / 17.0).sqrt();
    assert!((var.t_e() - expected_t_e).abs() <= 1e-15);
    assert_eq!(sim.events().top_time(), var.t_e());
}

fn coupled_pair(sim: &mut Simulation, method: Method, suffix: &str) -> (VarId, VarId) {
    let x1 = sim
        .add_variable(&format!("x1{suffix}"), method, 1e-4, 1e-4, 0.0)
        .expect("x1");
    let x2 = sim
        .add_variable(&format!("x2{suffix}"), method, 1e-4, 1e-4, 2.0)
        .expect("x2");
    sim.derivative_mut(x1)
        .expect("derivative")
        .add(-0.5, x1)
        .add(1.5, x2);
    sim.derivative_mut(x2).expect("derivative").add(-1.0, x1);
    (x1, x2)
}

#[test]
fn coupled_pair_stays_bounded() {
    let mut sim = Simulation::new(settings(20.0));
    let (x1, x2) = coupled_pair(&mut sim, Method::Qss2, "");
    let mut recorder = Recorder::new(RecorderSettings {
        sample_step: Some(0.05),
        all_variables: true,
    });
    let stats = sim.run(&mut recorder).expect("run");

    assert!(stats.requantizations > 0);
    assert!(stats.observer_updates > 0);
    assert_eq!(sim.variable(x1).observers(), &[x1, x2]);
    assert_eq!(sim.variable(x2).observers(), &[x1]);
    for trace in recorder.traces() {
        for sample in trace.x.iter().chain(&trace.q) {
            assert!(sample.value.is_finite());
            assert!(sample.value.abs() < 10.0, "{}: {sample}", trace.name);
        }
    }
    // Damped oscillation: the pair decays toward the origin.
    let end = sim.settings().end_time;
    assert!(sim.variable(x1).x(end).abs() < 0.5);
    assert!(sim.variable(x2).x(end).abs() < 0.5);
}

#[test]
fn mirrored_pair_triggers_simultaneously_and_stays_identical() {
    for method in METHODS {
        let mut sim = Simulation::new(settings(10.0));
        let (x1, x2) = coupled_pair(&mut sim, method, "");
        let (y1, y2) = coupled_pair(&mut sim, method, "_mirror");
        sim.initialize().expect("initialize");
        assert!(sim.events().simultaneous(), "{method}");

        let mut log = TriggerLog::default();
        let stats = sim.run(&mut log).expect("run");
        assert!(log.started && log.finished);
        assert!(stats.simultaneous_events > 0, "{method}");
        assert_eq!(stats.requantizations % 2, 0, "{method}");
        for (t, triggers) in &log.events {
            assert!(triggers.len() >= 2, "{method}: lone trigger at t={t}");
            assert_eq!(triggers.contains(&x1), triggers.contains(&y1));
            assert_eq!(triggers.contains(&x2), triggers.contains(&y2));
        }

        let end = sim.settings().end_time;
        for (a, b) in [(x1, y1), (x2, y2)] {
            let (a, b) = (sim.variable(a), sim.variable(b));
            assert_eq!(
                a.continuous_coefficients(),
                b.continuous_coefficients(),
                "{method}: {}",
                a.name()
            );
            assert!((a.x(end) - b.x(end)).abs() <= 1e-12, "{method}");
            assert!((a.q(end) - b.q(end)).abs() <= 1e-12, "{method}");
            assert_eq!(a.t_e(), b.t_e(), "{method}");
            assert!(
                a.x(end).abs() < 0.5,
                "{method}: {} = {}",
                a.name(),
                a.x(end)
            );
        }
    }
}

#[test]
fn simultaneous_triggers_read_committed_values() {
    let mut sim = Simulation::new(settings(1.0));
    let x = sim
        .add_variable("x", Method::Qss1, 1e-3, 0.0, 1.0)
        .expect("x");
    let y = sim
        .add_variable("y", Method::Qss1, 1e-3, 0.0, 1.0)
        .expect("y");
    sim.derivative_mut(x).expect("derivative").add(1.0, y);
    sim.derivative_mut(y).expect("derivative").add(1.0, x);
    sim.initialize().expect("initialize");
    assert!(sim.events().simultaneous());
    assert_eq!(sim.events().simultaneous_variables(), vec![x, y]);

    let t = sim.events().top_time();
    let before = sim.variable(x).x(t);
    let triggers = sim.step().expect("step").expect("event before end time");
    assert_eq!(triggers, vec![x, y]);
    assert_eq!(sim.time(), t);

    let (vx, vy) = (sim.variable(x), sim.variable(y));
    assert_eq!(vx.centre(), before);
    assert_eq!(vy.centre(), before);
    // Each slope is the other's freshly committed quantized value.
    assert_eq!(vx.continuous_coefficients()[1], vy.q(t));
    assert_eq!(vy.continuous_coefficients()[1], vx.q(t));
    assert_eq!(vx.t_e(), vy.t_e());
    assert_eq!(sim.stats().simultaneous_events, 1);
    assert_eq!(sim.stats().observer_updates, 0);
}

#[test]
fn liqss1_settles_at_equilibrium() {
    let mut sim = Simulation::new(settings(20.0));
    let x = sim
        .add_variable("x", Method::Liqss1, 1e-4, 1e-3, 1.0)
        .expect("variable");
    sim.derivative_mut(x).expect("derivative").add(-1.0, x);

    let mut log = TriggerLog::default();
    let stats = sim.run(&mut log).expect("run");
    assert!(stats.requantizations > 100);
    assert!(stats.requantizations < 5_000);

    let mut previous = 0.0;
    for (t, _) in &log.events {
        assert!(t - previous > 1e-9, "zero-length step at t={t}");
        previous = *t;
    }

    let var = sim.variable(x);
    assert!(var.t_e() > 20.0);
    assert!(var.q(var.t_q()).abs() <= var.q_tol());
    assert!(var.centre().abs() <= 2.0 * var.q_tol());
}

#[test]
fn step_bounds_limit_requantization_spacing() {
    let mut sim = Simulation::new(settings(10.0));
    let fast = sim
        .add_variable("fast", Method::Qss1, 1e-3, 0.0, 0.0)
        .expect("fast");
    let flat = sim
        .add_variable("flat", Method::Qss2, 1e-3, 0.0, 0.0)
        .expect("flat");
    sim.derivative_mut(fast).expect("derivative").add_constant(3.0);
    sim.derivative_mut(flat).expect("derivative").add_constant(1.0);
    sim.set_dt_min(fast, 0.01).expect("dt_min");
    sim.set_dt_max(flat, Some(0.5)).expect("dt_max");

    let mut log = TriggerLog::default();
    sim.run(&mut log).expect("run");

    let fast_times: Vec<f64> = log
        .events
        .iter()
        .filter(|(_, ids)| ids.contains(&fast))
        .map(|(t, _)| *t)
        .collect();
    assert!(fast_times.windows(2).all(|w| w[1] - w[0] >= 0.01 - 1e-12));

    let flat_count = log
        .events
        .iter()
        .filter(|(_, ids)| ids.contains(&flat))
        .count();
    assert_eq!(flat_count, 20);
    let var = sim.variable(flat);
    assert!((var.q(var.t_q()) - var.t_q()).abs() < 1e-9);
}

#[test]
fn harmonic_oscillator_with_inflection_steps() {
    let mut sim = Simulation::new(SolverSettings {
        end_time: 10.0,
        inflection_steps: true,
        ..SolverSettings::default()
    });
    let x = sim
        .add_variable("x", Method::Qss2, 1e-5, 1e-5, 1.0)
        .expect("x");
    let y = sim
        .add_variable("y", Method::Qss2, 1e-5, 1e-5, 0.0)
        .expect("y");
    sim.derivative_mut(x).expect("derivative").add(1.0, y);
    sim.derivative_mut(y).expect("derivative").add(-1.0, x);

    let mut recorder = Recorder::new(RecorderSettings {
        sample_step: Some(0.5),
        all_variables: true,
    });
    sim.run(&mut recorder).expect("run");

    let xs = &recorder.trace("x").expect("x trace").x;
    let ys = &recorder.trace("y").expect("y trace").x;
    for (sx, sy) in xs.iter().zip(ys) {
        assert_eq!(sx.time, sy.time);
        assert!((sx.value - sx.time.cos()).abs() < 1e-2, "x: {sx}");
        assert!((sy.value + sy.time.sin()).abs() < 1e-2, "y: {sy}");
    }
}

#[test]
fn reset_allows_an_identical_rerun() {
    let (mut sim, x) = decay(Method::Qss2, 1e-4, 5.0);
    let first = sim.run(&mut ()).expect("first run");
    let first_q = sim.variable(x).q(5.0);

    sim.reset();
    let second = sim.run(&mut ()).expect("second run");
    assert_eq!(first, second);
    assert_eq!(sim.variable(x).q(5.0), first_q);
}

/// `x' = -x + u` with `u = 0.05 + 0.5·sin t` and `x(0) = 1`.
fn sine_driven_decay() -> (Simulation, VarId, VarId) {
    let mut sim = Simulation::new(settings(10.0));
    let x = sim
        .add_variable("x", Method::Qss2, 1e-4, 0.0, 1.0)
        .expect("x");
    let u = sim
        .add_input("u", SineInput::new(0.05, 0.5), 1e-4, 0.0)
        .expect("u");
    sim.set_dt_max(u, Some(0.1)).expect("dt_max");
    sim.derivative_mut(x)
        .expect("derivative")
        .add(-1.0, x)
        .add(1.0, u);
    (sim, x, u)
}

fn sine_driven_exact(t: f64) -> f64 {
    0.05 + 0.25 * t.sin() - 0.25 * t.cos() + 1.2 * (-t).exp()
}

#[test]
fn sine_input_drives_decay_toward_analytic_solution() {
    init_logger();
    let (mut sim, x, u) = sine_driven_decay();
    assert!(sim.derivative_mut(u).is_err());
    let mut recorder = Recorder::new(RecorderSettings {
        sample_step: Some(0.1),
        all_variables: true,
    });
    let stats = sim.run(&mut recorder).expect("run");
    assert!(stats.observer_updates > 0);
    assert_eq!(sim.variable(u).observers(), &[x]);
    assert_eq!(sim.variable(x).observers(), &[x]);

    let xs = recorder.trace("x").expect("x trace");
    assert!(xs.x.len() > 100);
    for sample in &xs.x {
        let exact = sine_driven_exact(sample.time);
        assert!((sample.value - exact).abs() < 1e-3, "x: {sample}");
    }
    let us = recorder.trace("u").expect("u trace");
    for (q, x) in us.q.iter().zip(&us.x) {
        let exact = 0.05 + 0.5 * q.time.sin();
        assert!((x.value - exact).abs() <= 2e-4, "u: {x} vs {exact}");
        assert!((q.value - exact).abs() <= 2.5e-4, "u quantized: {q}");
    }
}

#[test]
fn sine_input_requantizes_within_its_step_bound() {
    let (mut sim, _, u) = sine_driven_decay();
    let mut log = TriggerLog::default();
    sim.run(&mut log).expect("run");

    let times: Vec<f64> = log
        .events
        .iter()
        .filter(|(_, ids)| ids.contains(&u))
        .map(|(t, _)| *t)
        .collect();
    assert!(times.len() >= 100);
    assert!(times[0] <= 0.1 + 1e-12);
    assert!(times.windows(2).all(|w| w[1] - w[0] <= 0.1 + 1e-12));

    let var = sim.variable(u);
    assert!(var.is_input());
    assert!(var.t_e() - var.t_q() <= 0.1 + 1e-12);
    let t = var.t_q();
    assert_eq!(var.q(t), 0.05 + 0.5 * t.sin());
}
