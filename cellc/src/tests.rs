/**
 * Copyright 2022 - Jahred Love
 *
 * Redistribution and use in source and binary forms, with or without modification,
 * are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 * list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice, this
 * list of conditions and the following disclaimer in the documentation and/or other
 * materials provided with the distribution.
 *
 * 3. Neither the name of the copyright holder nor the names of its contributors may
 * be used to endorse or promote products derived from this software without specific
 * prior written permission.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS “AS IS” AND
 * ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED
 * WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED.
 * IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT,
 * INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT
 * NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
 * PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
 * WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE)
 * ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE
 * POSSIBILITY OF SUCH DAMAGE.
 */

#[cfg(test)]
mod integration {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use crate::compile::{compile_bytes, compile_str, Compiler, ENTRY_NAME};
    use crate::error::CompileError;
    use crate::interp::{CellRef, Config, Heap, Machine};
    use crate::ir::{IrFunction, IrModule, IrOp};
    use crate::source::Pos;
    use crate::{format, verify};

    fn main_fn(m: &IrModule) -> &IrFunction {
        m.func(m.find(ENTRY_NAME).unwrap()).unwrap()
    }

    fn phi_arities(m: &IrModule) -> Vec<usize> {
        main_fn(m)
            .blocks
            .iter()
            .flat_map(|b| b.insns.iter())
            .filter_map(|i| match &i.op {
                IrOp::Phi { incomings, .. } => Some(incomings.len()),
                _ => None,
            })
            .collect()
    }

    fn execute(src: &str, input: &[u8]) -> (Vec<u8>, Heap) {
        let m = compile_str(src).unwrap();
        let mut vm = Machine::new(&m, input, Vec::new(), Config { fuel: Some(10_000_000) });
        vm.run(ENTRY_NAME).unwrap();
        let heap = vm.heap().clone();
        (vm.into_output(), heap)
    }

    fn cell_value(heap: &Heap, offset: isize) -> u8 {
        let c = heap.walk(CellRef(0), offset).unwrap();
        heap.get(c).unwrap().value
    }

    /// Position of the byte appended after `prefix`.
    fn pos_after(prefix: &str) -> Pos {
        let line = 1 + prefix.matches('\n').count();
        let col = prefix.rsplit('\n').next().map(str::len).unwrap_or(0) + 1;
        Pos::new(line, col)
    }

    #[test]
    fn multiply_loop_moves_product_one_cell_right() {
        let src = "+++[>+++<-]";
        let m = compile_str(src).unwrap();

        let heads: Vec<_> = main_fn(&m)
            .blocks
            .iter()
            .filter(|b| b.label.as_deref() == Some("loop.head"))
            .collect();
        assert_eq!(heads.len(), 1);
        assert_eq!(phi_arities(&m), vec![2, 2]);

        let (out, heap) = execute(src, b"");
        assert!(out.is_empty());
        assert_eq!(cell_value(&heap, 0), 0);
        assert_eq!(cell_value(&heap, 1), 9);
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn lone_close_fails_at_first_column() {
        assert_eq!(
            compile_str("]").unwrap_err(),
            CompileError::UnmatchedClose { at: Pos::new(1, 1) }
        );
    }

    #[test]
    fn open_loop_fails_at_end_of_input() {
        let mut c = Compiler::new();
        c.translate_symbol(b'[').unwrap();
        c.translate_symbol(b'+').unwrap();
        assert_eq!(
            c.finish().unwrap_err(),
            CompileError::UnterminatedLoop {
                at: Pos::new(1, 2),
                opened_at: Pos::new(1, 1),
            }
        );
    }

    #[test]
    fn unmatched_close_reports_line_and_column() {
        let src = "+[-]\n  ]+";
        let err = compile_str(src).unwrap_err();
        assert_eq!(err, CompileError::UnmatchedClose { at: Pos::new(2, 3) });
        let rendered = err.render(src.as_bytes(), Some("t.b"));
        assert!(rendered.starts_with("t.b:2:3: error: unexpected ']'"), "rendered:\n{rendered}");
    }

    #[test]
    fn columns_count_bytes_of_multibyte_commentary() {
        let err = compile_str("é]").unwrap_err();
        assert_eq!(err, CompileError::UnmatchedClose { at: Pos::new(1, 3) });

        let rendered = err.render("é]".as_bytes(), None);
        assert_eq!(rendered, "1:3: error: unexpected ']'\né]\n ^");
    }

    #[test]
    fn invalid_utf8_commentary_is_ignored() {
        let m = compile_bytes(b"\xff\xfe+\x80[-]").unwrap();
        assert_eq!(phi_arities(&m), vec![2, 2]);
        assert_eq!(
            compile_bytes(b"+\n\xc3]").unwrap_err(),
            CompileError::UnmatchedClose { at: Pos::new(2, 2) }
        );
    }

    #[test]
    fn container_input_runs_like_the_source() {
        let src = "++++++[>++++++++<-]>+.";
        let mut bytes = Vec::new();
        format::write_module(&compile_str(src).unwrap(), &mut bytes).unwrap();
        assert!(format::is_container(&bytes));

        let loaded = format::read_module(&mut &bytes[..]).unwrap();
        verify::verify_module(&loaded).unwrap();
        let mut vm = Machine::new(&loaded, &b""[..], Vec::new(), Config { fuel: Some(100_000) });
        vm.run(ENTRY_NAME).unwrap();
        assert_eq!(vm.into_output(), b"1");
    }

    #[test]
    fn increments_wrap_modulo_256() {
        let (out, _) = execute(&format!("{}.-.", "+".repeat(256)), b"");
        assert_eq!(out, [0, 255]);
    }

    #[test]
    fn hello_world_runs() {
        let src = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
        let (out, heap) = execute(src, b"");
        assert_eq!(String::from_utf8(out).unwrap(), "Hello World!\n");
        heap.check_links().unwrap();
    }

    #[test]
    fn tape_grows_to_the_left_of_origin() {
        let (out, heap) = execute("<<+>>.<<.", b"");
        assert_eq!(out, [0, 1]);
        assert_eq!(cell_value(&heap, -2), 1);
        assert_eq!(heap.len(), 3);
    }

    #[test]
    fn comments_are_ignored() {
        let (out, _) = execute("add one: +\nprint it: .", b"");
        assert_eq!(out, [1]);
    }

    #[test]
    fn input_is_read_into_the_current_cell() {
        let (out, heap) = execute(",>,<.>.", b"xy");
        assert_eq!(out, b"xy");
        assert_eq!(cell_value(&heap, 0), b'x');
        assert_eq!(cell_value(&heap, 1), b'y');
    }

    fn balanced() -> impl Strategy<Value = String> {
        let leaf = prop::sample::select(vec!['+', '-', '<', '>', '.', ',', ' ', 'x', '\n']).prop_map(|c| c.to_string());
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(|v| v.concat()),
                prop::collection::vec(inner, 0..8).prop_map(|v| format!("[{}]", v.concat())),
            ]
        })
    }

    fn straight_line() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(vec!['+', '-', '<', '>']), 0..200)
            .prop_map(|v| v.into_iter().collect())
    }

    proptest! {
        /// Balanced programs always finish with fully resolved merge points.
        #[test]
        fn prop_balanced_programs_resolve_every_phi(src in balanced()) {
            let m = compile_str(&src);
            prop_assert!(m.is_ok(), "{:?}", m.as_ref().err());
            let m = m.unwrap();
            let arities = phi_arities(&m);
            prop_assert_eq!(arities.len(), 2 * src.matches('[').count());
            prop_assert!(arities.iter().all(|&n| n == 2));
        }

        #[test]
        fn prop_unmatched_close_stops_at_that_symbol(prefix in balanced(), suffix in balanced()) {
            let src = format!("{prefix}]{suffix}");
            prop_assert_eq!(
                compile_str(&src).unwrap_err(),
                CompileError::UnmatchedClose { at: pos_after(&prefix) }
            );
        }

        #[test]
        fn prop_unmatched_open_is_unterminated(prefix in balanced(), suffix in balanced()) {
            let src = format!("{prefix}[{suffix}");
            let err = compile_str(&src).unwrap_err();
            prop_assert!(
                matches!(err, CompileError::UnterminatedLoop { opened_at, .. } if opened_at == pos_after(&prefix)),
                "got {:?}", err
            );
        }

        /// Straight-line programs leave the heap mirrored and matching a
        /// plain map-based model of the tape.
        #[test]
        fn prop_tape_matches_model(src in straight_line()) {
            let (_, heap) = execute(&src, b"");
            prop_assert!(heap.check_links().is_ok(), "{:?}", heap.check_links());

            let mut model: HashMap<isize, u8> = HashMap::from([(0, 0)]);
            let mut at = 0isize;
            for c in src.chars() {
                match c {
                    '+' => { let v = model.entry(at).or_default(); *v = v.wrapping_add(1); }
                    '-' => { let v = model.entry(at).or_default(); *v = v.wrapping_sub(1); }
                    '>' => { at += 1; model.entry(at).or_default(); }
                    '<' => { at -= 1; model.entry(at).or_default(); }
                    _ => {}
                }
            }
            prop_assert_eq!(heap.len(), model.len());
            for (&off, &v) in &model {
                prop_assert_eq!(cell_value(&heap, off), v, "offset {}", off);
            }
        }

        #[test]
        fn prop_wraparound(n in 0usize..600) {
            let (out, _) = execute(&format!("{}.", "+".repeat(n)), b"");
            prop_assert_eq!(out, vec![(n % 256) as u8]);
        }
    }
}
