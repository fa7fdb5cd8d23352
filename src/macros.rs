//! Declarative macros for pipeline definitions

/// Creates a shell command step
#[macro_export]
macro_rules! sh {
    ($cmd:expr) => {
        $crate::pipeline::Step::shell($cmd)
    };
}

/// Creates an echo step
#[macro_export]
macro_rules! echo {
    ($msg:expr) => {
        $crate::pipeline::Step::echo($msg)
    };
}

/// Creates a stage
#[macro_export]
macro_rules! stage {
    ($name:expr, $steps:expr) => {
        $crate::pipeline::Stage::new($name, $steps)
    };
}

/// Creates a list of steps
#[macro_export]
macro_rules! steps {
    ($($step:expr),* $(,)?) => {
        vec![$($step),*]
    };
}

/// Creates post-conditions
#[macro_export]
macro_rules! post {
    ( $( $cond:ident ( $($step:expr),* $(,)? ) ),* $(,)? ) => {{
        vec![
            $(
                $crate::pipeline::PostCondition::$cond(vec![$($step),*]),
            )*
        ]
    }};
}

/// Creates a when condition
#[macro_export]
macro_rules! when {
    (branch($branch:expr)) => {
        $crate::pipeline::WhenCondition::branch($branch)
    };
    (release_branch) => {
        $crate::pipeline::WhenCondition::ReleaseBranch
    };
    (flag($flag:ident)) => {
        $crate::pipeline::WhenCondition::flag($crate::pipeline::ConfigFlag::$flag)
    };
    (not_empty($field:ident)) => {
        $crate::pipeline::WhenCondition::not_empty($crate::pipeline::ConfigField::$field)
    };
}

#[cfg(test)]
mod tests {
    use crate::pipeline::{ConfigField, ConfigFlag, PostCondition, Stage, Step, WhenCondition};

    #[test]
    fn test_step_macros() {
        assert_eq!(sh!("mvn -B package"), Step::shell("mvn -B package"));
        assert_eq!(echo!("hello"), Step::echo("hello"));
    }

    #[test]
    fn test_stage_macro() {
        let stage = stage!("Build", steps![sh!("a"), sh!("b")]);
        assert_eq!(stage, Stage::new("Build", vec![Step::shell("a"), Step::shell("b")]));
    }

    #[test]
    fn test_post_macro() {
        let post = post!(failure(sh!("logs")), always(sh!("down"), echo!("done")));
        assert_eq!(
            post,
            vec![
                PostCondition::failure(vec![Step::shell("logs")]),
                PostCondition::always(vec![Step::shell("down"), Step::echo("done")]),
            ]
        );
    }

    #[test]
    fn test_when_macro() {
        assert_eq!(when!(branch("main")), WhenCondition::branch("main"));
        assert_eq!(when!(release_branch), WhenCondition::ReleaseBranch);
        assert_eq!(
            when!(flag(RunTests)),
            WhenCondition::flag(ConfigFlag::RunTests)
        );
        assert_eq!(
            when!(not_empty(Registry)),
            WhenCondition::not_empty(ConfigField::Registry)
        );
    }
}
