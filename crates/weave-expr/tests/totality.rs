//! Property test backing `spec.md` §8: "Expression evaluation is total: no
//! input string causes the evaluator to raise out of its bounds."

use proptest::prelude::*;
use weave_expr::{Engine, MapContext};

proptest! {
    #[test]
    fn eval_never_panics_on_arbitrary_text(source in "\\PC{0,64}") {
        let engine = Engine::new();
        let ctx = MapContext::new();
        let _ = engine.eval(&source, &ctx);
    }

    #[test]
    fn render_template_never_panics_on_arbitrary_text(source in "\\PC{0,64}") {
        let engine = Engine::new();
        let ctx = MapContext::new();
        let _ = engine.render_template(&source, &ctx);
    }
}
