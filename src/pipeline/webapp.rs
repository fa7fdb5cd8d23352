//! The backend/frontend web application pipeline
//!
//! Build and test the backend, archive its package, build both images,
//! start the compose stack, wait for it to become ready and publish the
//! images when a registry is configured. The post block collects logs on
//! failure, logs out of the registry after publishing and takes the stack
//! down unless it should keep running.

use super::config::{ReadinessConfig, StackLayout};
use super::pipeline_def::Pipeline;
use super::stage::{ConfigField, ConfigFlag, Stage, StageBuilder, WhenCondition};
use super::steps::{Probe, Step};
use crate::infrastructure::config::Settings;
use crate::{echo, post, sh, stage, steps};

/// Pipeline name
pub const PIPELINE_NAME: &str = "webapp";

/// Glob of the backend package, relative to the workspace
pub const BACKEND_ARTIFACTS: &str = "${BACKEND_DIR}/target/*.jar";

const COMPOSE: &str = "docker compose -p ${COMPOSE_PROJECT} -f ${COMPOSE_FILE}";

/// Builds the web application pipeline for `settings`
#[must_use]
pub fn pipeline(settings: &Settings) -> Pipeline {
    let layout = StackLayout::from_settings(settings);
    let readiness = ReadinessConfig::from_settings(settings, &layout);

    Pipeline::builder()
        .name(PIPELINE_NAME)
        .with_environment(layout.variables())
        .stage(backend_build())
        .stage(stage!(
            "Archive Artifacts",
            steps![Step::archive(BACKEND_ARTIFACTS, true)]
        ))
        .stage(docker_build())
        .stage(stack_up())
        .stage(readiness_check(&readiness))
        .stage(publish())
        .environment(|env| {
            env.set("HEALTH_CONTAINER", &readiness.container)
                .set("HEALTH_URL", &readiness.url)
        })
        .posts(post!(
            failure(sh!(format!("{COMPOSE} logs --no-color")).ignoring_failure()),
            always(
                Step::when(
                    publishing(),
                    steps![sh!("docker logout ${REGISTRY}").ignoring_failure()],
                ),
                Step::when(
                    WhenCondition::not(WhenCondition::flag(ConfigFlag::KeepRunning)),
                    steps![sh!(format!("{COMPOSE} down -v --remove-orphans"))],
                ),
            )
        ))
        .build_unchecked()
}

fn backend_build() -> Stage {
    stage!(
        "Backend Build",
        steps![Step::branch(
            WhenCondition::flag(ConfigFlag::RunTests),
            steps![sh!("mvn -B clean verify").in_dir("${BACKEND_DIR}")],
            steps![sh!("mvn -B clean package -DskipTests").in_dir("${BACKEND_DIR}")],
        )]
    )
}

fn docker_build() -> Stage {
    stage!(
        "Docker Build",
        steps![
            sh!("docker build -t ${BACKEND_IMAGE}:${IMAGE_TAG} ${BACKEND_DIR}"),
            sh!("docker build -t ${FRONTEND_IMAGE}:${IMAGE_TAG} ${FRONTEND_DIR}"),
        ]
    )
}

fn stack_up() -> Stage {
    stage!(
        "Stack Up",
        steps![
            sh!(format!("{COMPOSE} down --remove-orphans")).ignoring_failure(),
            sh!(format!("{COMPOSE} up -d")),
        ]
    )
}

fn readiness_check(readiness: &ReadinessConfig) -> Stage {
    stage!(
        "Readiness Check",
        steps![
            Step::poll(
                Probe::output_equals(
                    "docker inspect --format '{{.State.Health.Status}}' ${HEALTH_CONTAINER}",
                    "healthy",
                ),
                readiness.attempts,
                readiness.health_delay,
            )
            .with_name("Backend health"),
            Step::poll(
                Probe::http_ok("${HEALTH_URL}"),
                readiness.attempts,
                readiness.http_delay,
            )
            .with_name("HTTP 200"),
            echo!("Stack is ready at ${HEALTH_URL}"),
        ]
    )
}

fn publish() -> Stage {
    let push = |image: &str, tag: &str| {
        steps![
            sh!(format!("docker tag {image}:${{IMAGE_TAG}} ${{REGISTRY}}/{image}:{tag}")),
            sh!(format!("docker push ${{REGISTRY}}/{image}:{tag}")),
        ]
    };

    let mut versioned = Vec::new();
    let mut floating = Vec::new();
    for image in ["${BACKEND_IMAGE}", "${FRONTEND_IMAGE}"] {
        versioned.extend(push(image, "${IMAGE_TAG}"));
        floating.extend(push(image, "latest"));
    }

    StageBuilder::new("Publish")
        .when(publishing())
        .step(
            sh!("docker login ${REGISTRY} --username ${REGISTRY_USERNAME} --password-stdin")
                .with_stdin("${REGISTRY_PASSWORD}"),
        )
        .steps(versioned)
        .step(Step::when(WhenCondition::ReleaseBranch, floating))
        .build_unchecked()
}

fn publishing() -> WhenCondition {
    WhenCondition::all_of(vec![
        WhenCondition::not_empty(ConfigField::Registry),
        WhenCondition::not_empty(ConfigField::Credentials),
    ])
}
