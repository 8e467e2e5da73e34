//! Measurement loops, one dispatch method per timing mode.
//!
//! A dispatch method picks the branch for the worker's subgroup. Each branch
//! acquires its fixtures, runs iteration setup, the warmup catch-up loop,
//! the measured stub, the cooldown catch-up loop and teardown, then reports
//! normalized results. Single-shot branches skip both catch-up loops.
//!
//! Stubs are separate `#[inline(never)]` functions so the measured loop is
//! compiled as a unit of its own.

use super::fixtures::{
    accessor_name, fixture_path, measured_ref, render_level_setup, render_level_teardown,
    render_trial_teardown,
};
use super::writer::SourceWriter;
use crate::group::{GroupMember, MethodGroup};
use crate::metadata::{AuxCounterKind, Level};
use crate::mode::Mode;
use crate::state::graph::MethodArg;
use crate::state::{StateGraph, StateId};

/// Name of the dispatch method for `mode`.
pub fn dispatch_name(group: &MethodGroup<'_>, mode: Mode) -> String {
    format!("{}_{}", group.name, mode.long_label())
}

/// Name of the measured stub of one member under `mode`.
pub fn stub_name(member: &GroupMember<'_>, mode: Mode) -> String {
    format!("{}_{}_stub", member.name(), mode.short_label())
}

/// Emits the loops of one method group.
pub struct LoopEmitter<'a, 'g> {
    group: &'a MethodGroup<'g>,
    graph: &'a StateGraph,
}

impl<'a, 'g> LoopEmitter<'a, 'g> {
    pub fn new(group: &'a MethodGroup<'g>, graph: &'a StateGraph) -> Self {
        Self { group, graph }
    }

    /// The public dispatch method for `mode`.
    pub fn render_dispatch(&self, mode: Mode) -> String {
        let mut w = SourceWriter::new();
        w.open(format!(
            "pub fn {}(&mut self, control: &InfraControl, thread_params: &ThreadParams) -> Result<IterationResult, HarnessError> {{",
            dispatch_name(self.group, mode)
        ));
        for (index, member) in self.group.members.iter().enumerate() {
            let cond = format!("if thread_params.subgroup_index() == {index} {{");
            if index == 0 {
                w.open(cond);
            } else {
                w.reopen(format!("}} else {cond}"));
            }
            self.render_branch(&mut w, member, mode);
        }
        w.reopen("} else {")
            .line("Err(HarnessError::SubgroupMismatch {")
            .line("    index: thread_params.subgroup_index(),")
            .line("})")
            .close("}")
            .close("}");
        w.finish()
    }

    /// Measured stubs for every member under `mode`, with their names.
    pub fn render_stubs(&self, mode: Mode) -> Vec<(String, String)> {
        self.group
            .members
            .iter()
            .map(|m| (stub_name(m, mode), self.render_stub(m, mode)))
            .collect()
    }

    fn render_branch(&self, w: &mut SourceWriter, member: &GroupMember<'_>, mode: Mode) {
        let method = member.name();
        let init = self.graph.init_order(method);
        let forward = self.graph.state_order(method, true);
        let reverse = self.graph.state_order(method, false);

        w.line("let mut res = RawResults::new();")
            .line("let mut bh = control.blackhole();")
            .line("let blackhole = &mut bh;");
        for &id in &init {
            let state = self.graph.state(id);
            let mut args = vec!["control".to_string(), "thread_params".to_string()];
            args.extend(
                state
                    .dependencies()
                    .into_iter()
                    .map(|d| format!("&{}", self.graph.state(d).local_identifier)),
            );
            w.line(format!(
                "let {} = self.{}({})?;",
                state.local_identifier,
                accessor_name(state),
                args.join(", ")
            ));
        }
        w.line("control.pre_setup()?;");
        for &id in &forward {
            if let Some(block) = render_level_setup(self.graph, self.graph.state(id), Level::Iteration) {
                w.block(&block);
            }
        }

        let catchup = mode != Mode::SingleShotTime;
        if catchup {
            w.line("control.announce_warmup_ready();");
            self.render_catchup(w, member, "warmup_should_wait", &forward, &reverse);
        }

        self.render_control_flag(w, &forward, "start_measurement");
        let mut stub_args = vec![
            "control".to_string(),
            "&mut res".to_string(),
            "blackhole".to_string(),
        ];
        match mode {
            Mode::SampleTime => {
                w.line("let mut buffer = SampleBuffer::new();")
                    .line("let target_samples = control.target_samples(Self::SAMPLES_PER_MS);")
                    .line("let batch_size = control.iteration_params().batch_size();");
                stub_args.extend([
                    "&mut buffer".to_string(),
                    "target_samples".to_string(),
                    "&mut self.sample_rnd_mask".to_string(),
                    "batch_size".to_string(),
                ]);
            }
            Mode::SingleShotTime => {
                w.line("let batch_size = control.iteration_params().batch_size();");
                stub_args.push("batch_size".to_string());
            }
            _ => {}
        }
        stub_args.extend(
            init.iter()
                .map(|id| format!("&{}", self.graph.state(*id).local_identifier)),
        );
        w.line(format!(
            "Self::{}({})?;",
            stub_name(member, mode),
            stub_args.join(", ")
        ));
        self.render_control_flag(w, &forward, "stop_measurement");

        if catchup {
            w.line("control.announce_warmdown_ready();");
            self.render_catchup(w, member, "warmdown_should_wait", &forward, &reverse);
        }
        w.line("control.pre_teardown()?;");
        for &id in &reverse {
            if let Some(block) =
                render_level_teardown(self.graph, self.graph.state(id), Level::Iteration)
            {
                w.block(&block);
            }
        }
        w.open("if control.is_last_iteration() {");
        for &id in &reverse {
            w.block(&render_trial_teardown(self.graph, self.graph.state(id)));
        }
        w.close("}");

        self.render_normalization(w, mode);
        self.render_results(w, member, mode);
        w.line("bh.evaporate();").line("Ok(results)");
    }

    /// Keep calling the method while siblings have not reached the same
    /// point.
    fn render_catchup(
        &self,
        w: &mut SourceWriter,
        member: &GroupMember<'_>,
        flag: &str,
        forward: &[StateId],
        reverse: &[StateId],
    ) {
        w.open(format!("while control.{flag}() {{"));
        self.render_invocation(w, member, forward, reverse, false);
        w.line("res.all_ops += 1.0;").close("}");
    }

    /// One benchmark call with its per-invocation helpers around it. When
    /// `timed` and helpers exist, only the call itself is added to
    /// `real_time`.
    fn render_invocation(
        &self,
        w: &mut SourceWriter,
        member: &GroupMember<'_>,
        forward: &[StateId],
        reverse: &[StateId],
        timed: bool,
    ) {
        let setups: Vec<String> = forward
            .iter()
            .filter_map(|id| render_level_setup(self.graph, self.graph.state(*id), Level::Invocation))
            .collect();
        let teardowns: Vec<String> = reverse
            .iter()
            .filter_map(|id| {
                render_level_teardown(self.graph, self.graph.state(*id), Level::Invocation)
            })
            .collect();
        let timed = timed && !(setups.is_empty() && teardowns.is_empty());
        for s in &setups {
            w.block(s);
        }
        if timed {
            w.line("let rt = Instant::now();");
        }
        w.line(self.method_call(member));
        if timed {
            w.line("real_time += rt.elapsed();");
        }
        for t in &teardowns {
            w.block(t);
        }
    }

    fn method_call(&self, member: &GroupMember<'_>) -> String {
        let method = member.method;
        let args: Vec<String> = self
            .graph
            .args(member.name())
            .iter()
            .map(|a| match a {
                MethodArg::State(id) => measured_ref(self.graph.state(*id)),
                MethodArg::Blackhole => "blackhole".to_string(),
            })
            .collect();
        let call = if method.is_static() {
            format!("{}::{}({})", method.owner.rust_path(), method.name, args.join(", "))
        } else {
            let holder = self
                .graph
                .holder()
                .map(|id| measured_ref(self.graph.state(id)))
                .unwrap_or_else(|| "l_bench.user()".to_string());
            format!("{holder}.{}({})", method.name, args.join(", "))
        };
        if method.returns_void() {
            format!("{call};")
        } else {
            format!("blackhole.consume({call});")
        }
    }

    fn render_control_flag(&self, w: &mut SourceWriter, order: &[StateId], flag: &str) {
        for &id in order {
            let state = self.graph.state(id);
            if state.is_control() {
                w.line(format!(
                    "{}.{flag}.store(true, Ordering::Release);",
                    measured_ref(state)
                ));
            }
        }
    }

    fn render_normalization(&self, w: &mut SourceWriter, mode: Mode) {
        match mode {
            Mode::Throughput | Mode::AverageTime => {
                w.line("res.all_ops += res.measured_ops;")
                    .line("let batch_size = f64::from(control.iteration_params().batch_size());")
                    .line("let ops_per_inv = f64::from(Self::OPS_PER_INVOCATION);")
                    .line("res.all_ops *= ops_per_inv / batch_size;")
                    .line("res.measured_ops *= ops_per_inv / batch_size;");
            }
            Mode::SampleTime => {
                w.line("let batch = f64::from(batch_size);")
                    .line("let ops_per_inv = f64::from(Self::OPS_PER_INVOCATION);")
                    .line("res.all_ops += res.measured_ops * batch;")
                    .line("res.all_ops *= ops_per_inv / batch;")
                    .line("res.measured_ops *= ops_per_inv;");
            }
            Mode::SingleShotTime | Mode::All => {
                w.line("let total_ops = f64::from(Self::OPS_PER_INVOCATION);")
                    .line("res.all_ops = total_ops;")
                    .line("res.measured_ops = total_ops;");
            }
        }
    }

    fn render_results(&self, w: &mut SourceWriter, member: &GroupMember<'_>, mode: Mode) {
        let unit = self.group.time_unit(mode).rust_path();
        w.line("let mut results = IterationResult::from_raw(&res);");
        let mut labels = vec![("ResultRole::Primary", self.group.name.as_str())];
        if self.group.members.len() > 1 {
            labels.push(("ResultRole::Secondary", member.name()));
        }
        for (role, label) in labels {
            let result = match mode {
                Mode::Throughput => format!(
                    "ThroughputResult::new({role}, \"{label}\", res.measured_ops, res.time(), {unit})"
                ),
                Mode::AverageTime => format!(
                    "AverageTimeResult::new({role}, \"{label}\", res.measured_ops, res.time(), {unit})"
                ),
                Mode::SampleTime => {
                    format!("SampleTimeResult::new({role}, \"{label}\", buffer.clone(), {unit})")
                }
                Mode::SingleShotTime | Mode::All => format!(
                    "SingleShotResult::new({role}, \"{label}\", res.time(), total_ops, {unit})"
                ),
            };
            w.line(format!("results.add({result});"));
        }

        for counter in self.graph.aux_counters(member.name()) {
            let value = format!(
                "{}.{} as f64",
                measured_ref(self.graph.state(counter.state)),
                counter.accessor
            );
            let result = match (counter.kind, mode) {
                (AuxCounterKind::Events, _) => format!(
                    "ScalarResult::new(ResultRole::Secondary, \"{}\", {value}, \"#\")",
                    counter.name
                ),
                (AuxCounterKind::Operations, Mode::Throughput) => format!(
                    "ThroughputResult::new(ResultRole::Secondary, \"{}\", {value}, res.time(), {unit})",
                    counter.name
                ),
                (AuxCounterKind::Operations, Mode::AverageTime) => format!(
                    "AverageTimeResult::new(ResultRole::Secondary, \"{}\", {value}, res.time(), {unit})",
                    counter.name
                ),
                (AuxCounterKind::Operations, _) => continue,
            };
            w.line(format!("results.add({result});"));
        }
    }

    fn render_stub(&self, member: &GroupMember<'_>, mode: Mode) -> String {
        let method = member.name();
        let init = self.graph.init_order(method);
        let forward = self.graph.state_order(method, true);
        let reverse = self.graph.state_order(method, false);

        let mut params = vec![
            "control: &InfraControl".to_string(),
            "res: &mut RawResults".to_string(),
            "blackhole: &mut Blackhole".to_string(),
        ];
        match mode {
            Mode::SampleTime => params.extend([
                "buffer: &mut SampleBuffer".to_string(),
                "target_samples: usize".to_string(),
                "start_rnd_mask: &mut i32".to_string(),
                "batch_size: i32".to_string(),
            ]),
            Mode::SingleShotTime => params.push("batch_size: i32".to_string()),
            _ => {}
        }
        params.extend(init.iter().map(|id| {
            let s = self.graph.state(*id);
            format!("{}: &{}", s.local_identifier, fixture_path(s))
        }));

        let mut w = SourceWriter::new();
        w.line("#[inline(never)]");
        if params.len() > 7 {
            w.line("#[allow(clippy::too_many_arguments)]");
        }
        w.open(format!(
            "fn {}({}) -> Result<(), HarnessError> {{",
            stub_name(member, mode),
            params.join(", ")
        ))
        .line("let mut real_time = Duration::ZERO;");

        match mode {
            Mode::Throughput | Mode::AverageTime => {
                w.line("let mut operations: u64 = 0;")
                    .line("res.start_time = Some(Instant::now());")
                    .open("loop {");
                self.render_invocation(&mut w, member, &forward, &reverse, true);
                w.line("operations += 1;")
                    .open("if control.is_done() {")
                    .line("break;")
                    .close("}")
                    .close("}")
                    .line("res.stop_time = Some(Instant::now());")
                    .line("res.real_time = real_time;")
                    .line("res.measured_ops = operations as f64;");
            }
            Mode::SampleTime => {
                w.line("let mut operations: u64 = 0;")
                    .line("let mut rnd = rnd_seed();")
                    .line("let mut rnd_mask = *start_rnd_mask;")
                    .line("let mut current_stride: usize = 0;")
                    .open("loop {")
                    .line("rnd = rnd.wrapping_mul(1664525).wrapping_add(1013904223);")
                    .line("let sample = (rnd & rnd_mask) == 0;")
                    .line("let time = if sample { Some(Instant::now()) } else { None };")
                    .open("for _ in 0..batch_size {")
                    .open("if control.volatile_spoiler() {")
                    .line("return Ok(());")
                    .close("}");
                self.render_invocation(&mut w, member, &forward, &reverse, true);
                w.close("}")
                    .open("if let Some(time) = time {")
                    .line("buffer.add(time.elapsed().as_nanos() as u64 / Self::OPS_PER_INVOCATION as u64);")
                    .open("if current_stride > target_samples {")
                    .line("buffer.half();")
                    .line("current_stride = 0;")
                    .line("rnd_mask = (rnd_mask << 1) + 1;")
                    .reopen("} else {")
                    .line("current_stride += 1;")
                    .close("}")
                    .close("}")
                    .line("operations += 1;")
                    .open("if control.is_done() {")
                    .line("break;")
                    .close("}")
                    .close("}")
                    .line("*start_rnd_mask = (*start_rnd_mask).max(rnd_mask);")
                    .line("res.real_time = real_time;")
                    .line("res.measured_ops = operations as f64;");
            }
            Mode::SingleShotTime | Mode::All => {
                w.line("res.start_time = Some(Instant::now());")
                    .open("for _ in 0..batch_size {")
                    .open("if control.volatile_spoiler() {")
                    .line("return Ok(());")
                    .close("}");
                self.render_invocation(&mut w, member, &forward, &reverse, true);
                w.close("}")
                    .line("res.stop_time = Some(Instant::now());")
                    .line("res.real_time = real_time;");
            }
        }
        w.line("Ok(())").close("}");
        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::group::assemble;
    use crate::identifiers::Identifiers;
    use crate::metadata::hierarchy::all_methods;
    use crate::metadata::{
        infra, Annotation, AnnotationKind, ClassInfo, ClassModel, FieldInfo, MetadataSource,
        MethodInfo, Scope,
    };

    fn emit(model: &ClassModel, holder: &str, f: impl FnOnce(&LoopEmitter<'_, '_>)) {
        let holder = model.resolve(holder).unwrap();
        let methods: Vec<_> = all_methods(model, holder)
            .into_iter()
            .filter(|m| m.annotations.has(AnnotationKind::Benchmark))
            .collect();
        let info = assemble(model, holder, &methods, &GeneratorConfig::new()).unwrap();
        let group = &info.groups[0];
        let mut graph = StateGraph::new("generated");
        graph
            .bind_methods(
                model,
                holder,
                group.members.iter().map(|m| m.method),
                &mut Identifiers::new(),
            )
            .unwrap();
        f(&LoopEmitter::new(group, &graph));
    }

    fn single() -> ClassModel {
        ClassModel::from_classes([
            ClassInfo::new("org.a.B").method(
                MethodInfo::new("measure")
                    .param("s", "org.a.S")
                    .returns("long")
                    .annotate(Annotation::Benchmark),
            ),
            ClassInfo::new("org.a.S")
                .state(Scope::Thread)
                .method(MethodInfo::new("prepare").annotate(Annotation::Setup {
                    level: Level::Invocation,
                })),
        ])
    }

    #[test]
    fn should_dispatch_single_method_on_subgroup_zero() {
        emit(&single(), "org.a.B", |e| {
            let text = e.render_dispatch(Mode::Throughput);
            assert!(text.starts_with("pub fn measure_Throughput(&mut self"));
            assert_eq!(text.matches("thread_params.subgroup_index() ==").count(), 1);
            assert!(text.contains("SubgroupMismatch"));
            assert!(text.contains("control.announce_warmup_ready();"));
            assert!(text.contains("while control.warmdown_should_wait() {"));
            assert!(text.contains("Self::measure_thrpt_stub(control, &mut res, blackhole,"));
            assert!(text.contains("ThroughputResult::new(ResultRole::Primary, \"measure\""));
            assert!(!text.contains("ResultRole::Secondary"));
        });
    }

    #[test]
    fn should_consume_return_value_and_time_call_only() {
        emit(&single(), "org.a.B", |e| {
            let stubs = e.render_stubs(Mode::AverageTime);
            let (name, text) = &stubs[0];
            assert_eq!(name, "measure_avgt_stub");
            assert!(text.starts_with("#[inline(never)]"));
            assert!(text.contains("blackhole.consume(l_b0_t.user().measure(l_s1_t.user()));"));
            assert!(text.contains("user().prepare();"));
            assert!(text.contains("real_time += rt.elapsed();"));
            assert!(text.contains("if control.is_done() {"));
        });
    }

    #[test]
    fn should_sample_with_shrinking_mask() {
        emit(&single(), "org.a.B", |e| {
            let (_, text) = &e.render_stubs(Mode::SampleTime)[0];
            assert!(text.contains("rnd.wrapping_mul(1664525).wrapping_add(1013904223)"));
            assert!(text.contains("buffer.half();"));
            assert!(text.contains("*start_rnd_mask = (*start_rnd_mask).max(rnd_mask);"));
            let compare = text.find("if current_stride > target_samples {").unwrap();
            let bump = text.find("current_stride += 1;").unwrap();
            assert!(compare < bump);
            assert!(text.contains("if control.volatile_spoiler() {"));
            let dispatch = e.render_dispatch(Mode::SampleTime);
            assert!(dispatch.contains("&mut self.sample_rnd_mask"));
            assert!(dispatch.contains("SampleTimeResult::new"));
        });
    }

    #[test]
    fn should_lend_shared_fixtures_immutably_to_measured_call() {
        let model = ClassModel::from_classes([
            ClassInfo::new("org.a.B").state(Scope::Benchmark).method(
                MethodInfo::new("measure")
                    .param("s", "org.a.S")
                    .param("t", "org.a.T")
                    .annotate(Annotation::Benchmark),
            ),
            ClassInfo::new("org.a.S").state(Scope::Group),
            ClassInfo::new("org.a.T").state(Scope::Thread),
        ]);
        emit(&model, "org.a.B", |e| {
            let (_, text) = &e.render_stubs(Mode::Throughput)[0];
            let call = text.lines().find(|l| l.contains(".measure(")).unwrap().trim();
            assert!(call.starts_with("l_b0_b.shared().measure("), "{call}");
            assert!(call.contains("_g.shared(), "), "{call}");
            assert!(call.ends_with("_t.user());"), "{call}");
        });
    }

    #[test]
    fn should_skip_catchup_loops_in_single_shot() {
        emit(&single(), "org.a.B", |e| {
            let text = e.render_dispatch(Mode::SingleShotTime);
            assert!(!text.contains("warmup_should_wait"));
            assert!(!text.contains("warmdown_should_wait"));
            assert!(text.contains("SingleShotResult::new"));
            let (_, stub) = &e.render_stubs(Mode::SingleShotTime)[0];
            assert!(stub.contains("for _ in 0..batch_size {"));
            assert!(!stub.contains("is_done"));
        });
    }

    #[test]
    fn should_branch_per_group_member_and_report_secondaries() {
        let model = ClassModel::from_classes([ClassInfo::new("org.a.B")
            .state(Scope::Group)
            .method(
                MethodInfo::new("get")
                    .annotate(Annotation::Benchmark)
                    .annotate(Annotation::Group { name: "g".into() })
                    .annotate(Annotation::GroupThreads { threads: 3 }),
            )
            .method(
                MethodInfo::new("put")
                    .annotate(Annotation::Benchmark)
                    .annotate(Annotation::Group { name: "g".into() }),
            )]);
        emit(&model, "org.a.B", |e| {
            let text = e.render_dispatch(Mode::Throughput);
            assert!(text.starts_with("pub fn g_Throughput("));
            assert!(text.contains("if thread_params.subgroup_index() == 0 {"));
            assert!(text.contains("} else if thread_params.subgroup_index() == 1 {"));
            assert!(text.contains("ResultRole::Secondary, \"get\""));
            assert!(text.contains("ResultRole::Secondary, \"put\""));
            assert_eq!(
                text.matches("let l_b0_g = self.try_init_f_b0_g(control, thread_params)?;").count(),
                2
            );
        });
    }

    #[test]
    fn should_flip_control_flags_around_stub() {
        let model = ClassModel::from_classes([ClassInfo::new("org.a.B")
            .method(
                MethodInfo::new("a")
                    .param("c", infra::CONTROL)
                    .annotate(Annotation::Benchmark)
                    .annotate(Annotation::Group { name: "g".into() }),
            )]);
        emit(&model, "org.a.B", |e| {
            let text = e.render_dispatch(Mode::Throughput);
            let start = text.find("start_measurement.store(true").unwrap();
            let stub = text.find("Self::a_thrpt_stub").unwrap();
            let stop = text.find("stop_measurement.store(true").unwrap();
            assert!(start < stub && stub < stop);
        });
    }

    #[test]
    fn should_report_aux_counters_by_kind() {
        let model = ClassModel::from_classes([
            ClassInfo::new("org.a.B").method(
                MethodInfo::new("measure")
                    .param("c", "org.a.C")
                    .annotate(Annotation::Benchmark),
            ),
            ClassInfo::new("org.a.C")
                .state(Scope::Thread)
                .annotate(Annotation::AuxCounters {
                    kind: AuxCounterKind::Events,
                })
                .field(FieldInfo::new("hits", "long")),
        ]);
        emit(&model, "org.a.B", |e| {
            let text = e.render_dispatch(Mode::SampleTime);
            assert!(text.contains("ScalarResult::new(ResultRole::Secondary, \"hits\""));
            assert!(text.contains(".user().hits as f64"));
        });
    }
}
