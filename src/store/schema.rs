//! Database schema for one tenant.
//!
//! Specification side: product_specifications -> process_step_specifications
//! -> process_parameters / quality_characteristics. Instance side: products
//! -> process_steps -> sensor_readings. The ML layer adds dataframes (with
//! four selection join tables), pipeline blocks and runs.

/// All DDL statements, in dependency order. Every statement is idempotent.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_PRODUCT_SPECIFICATIONS,
        CREATE_PRODUCTS,
        CREATE_ML_RUN_SPECIFICATIONS_STUB,
        CREATE_ML_RUNS,
        CREATE_PROCESS_STEP_SPECIFICATIONS,
        CREATE_PROCESS_STEPS,
        CREATE_PROCESS_PARAMETERS,
        CREATE_QUALITY_CHARACTERISTICS,
        CREATE_SENSORS,
        CREATE_SENSOR_READINGS,
        CREATE_SENSOR_READING_INDEXES,
        CREATE_DATAFRAMES,
        CREATE_DATAFRAME_STEP_SPECIFICATIONS,
        CREATE_DATAFRAME_PARAMETERS,
        CREATE_DATAFRAME_CHARACTERISTICS,
        CREATE_DATAFRAME_TARGETS,
        CREATE_PIPELINE_BLOCK_SPECIFICATIONS,
        CREATE_PIPELINE_BLOCKS,
        CREATE_RUN_SPECIFICATION_BLOCKS,
        ALTER_ML_RUN_SPECIFICATIONS,
    ]
}

const CREATE_PRODUCT_SPECIFICATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS product_specifications (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100)
)
"#;

const CREATE_PRODUCTS: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100),
    product_specification_id BIGINT REFERENCES product_specifications(id) ON DELETE SET NULL
)
"#;

// ml_run_specifications is created before ml_runs and process step
// specifications reference ml_runs, so the table is created in two steps:
// a stub first, foreign keys added once ml_runs and dataframes exist.
const CREATE_ML_RUN_SPECIFICATIONS_STUB: &str = r#"
CREATE TABLE IF NOT EXISTS ml_run_specifications (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100),
    pipeline_order JSONB,
    workflow_template VARCHAR(200),
    save_path VARCHAR(200),
    create_new_template BOOLEAN NOT NULL DEFAULT TRUE
)
"#;

const CREATE_ML_RUNS: &str = r#"
CREATE TABLE IF NOT EXISTS ml_runs (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100),
    status VARCHAR(20) NOT NULL DEFAULT 'Other',
    save_path VARCHAR(200),
    parameter JSONB,
    external_job_id VARCHAR(200),
    deployed BOOLEAN NOT NULL DEFAULT FALSE,
    ml_run_specification_id BIGINT REFERENCES ml_run_specifications(id) ON DELETE SET NULL
)
"#;

const CREATE_PROCESS_STEP_SPECIFICATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS process_step_specifications (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100),
    optional BOOLEAN,
    product_specification_id BIGINT REFERENCES product_specifications(id) ON DELETE SET NULL,
    ml_run_id BIGINT REFERENCES ml_runs(id) ON DELETE SET NULL
)
"#;

const CREATE_PROCESS_STEPS: &str = r#"
CREATE TABLE IF NOT EXISTS process_steps (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100),
    status VARCHAR(100) NOT NULL DEFAULT 'Other',
    product_id BIGINT REFERENCES products(id) ON DELETE SET NULL,
    process_step_specification_id BIGINT REFERENCES process_step_specifications(id) ON DELETE SET NULL
)
"#;

const CREATE_PROCESS_PARAMETERS: &str = r#"
CREATE TABLE IF NOT EXISTS process_parameters (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    process_step_specification_id BIGINT REFERENCES process_step_specifications(id) ON DELETE SET NULL
)
"#;

const CREATE_QUALITY_CHARACTERISTICS: &str = r#"
CREATE TABLE IF NOT EXISTS quality_characteristics (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    process_step_specification_id BIGINT REFERENCES process_step_specifications(id) ON DELETE SET NULL
)
"#;

const CREATE_SENSORS: &str = r#"
CREATE TABLE IF NOT EXISTS sensors (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    description TEXT,
    virtual_sensor BOOLEAN NOT NULL DEFAULT FALSE,
    quality_characteristic_id BIGINT REFERENCES quality_characteristics(id) ON DELETE SET NULL,
    ml_run_id BIGINT REFERENCES ml_runs(id) ON DELETE SET NULL
)
"#;

const CREATE_SENSOR_READINGS: &str = r#"
CREATE TABLE IF NOT EXISTS sensor_readings (
    id BIGSERIAL PRIMARY KEY,
    value DOUBLE PRECISION,
    date TIMESTAMPTZ,
    sensor_id BIGINT REFERENCES sensors(id) ON DELETE SET NULL,
    process_step_id BIGINT REFERENCES process_steps(id) ON DELETE SET NULL,
    process_parameter_id BIGINT REFERENCES process_parameters(id) ON DELETE SET NULL,
    quality_characteristic_id BIGINT REFERENCES quality_characteristics(id) ON DELETE SET NULL
)
"#;

const CREATE_SENSOR_READING_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_sensor_readings_process_step
    ON sensor_readings(process_step_id);
CREATE INDEX IF NOT EXISTS idx_sensor_readings_process_parameter
    ON sensor_readings(process_parameter_id);
CREATE INDEX IF NOT EXISTS idx_sensor_readings_quality_characteristic
    ON sensor_readings(quality_characteristic_id);
CREATE INDEX IF NOT EXISTS idx_sensor_readings_sensor
    ON sensor_readings(sensor_id);
CREATE INDEX IF NOT EXISTS idx_process_steps_product
    ON process_steps(product_id);
CREATE INDEX IF NOT EXISTS idx_process_steps_specification
    ON process_steps(process_step_specification_id)
"#;

const CREATE_DATAFRAMES: &str = r#"
CREATE TABLE IF NOT EXISTS dataframes (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100),
    description TEXT,
    status VARCHAR(20) NOT NULL DEFAULT 'Other',
    save_path VARCHAR(200),
    product_amount BIGINT NOT NULL DEFAULT 500000,
    random_records BOOLEAN NOT NULL DEFAULT TRUE,
    product_specification_id BIGINT REFERENCES product_specifications(id) ON DELETE SET NULL
)
"#;

const CREATE_DATAFRAME_STEP_SPECIFICATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS dataframe_step_specifications (
    dataframe_id BIGINT NOT NULL REFERENCES dataframes(id) ON DELETE CASCADE,
    process_step_specification_id BIGINT NOT NULL REFERENCES process_step_specifications(id) ON DELETE CASCADE,
    PRIMARY KEY (dataframe_id, process_step_specification_id)
)
"#;

const CREATE_DATAFRAME_PARAMETERS: &str = r#"
CREATE TABLE IF NOT EXISTS dataframe_parameters (
    dataframe_id BIGINT NOT NULL REFERENCES dataframes(id) ON DELETE CASCADE,
    process_parameter_id BIGINT NOT NULL REFERENCES process_parameters(id) ON DELETE CASCADE,
    PRIMARY KEY (dataframe_id, process_parameter_id)
)
"#;

const CREATE_DATAFRAME_CHARACTERISTICS: &str = r#"
CREATE TABLE IF NOT EXISTS dataframe_characteristics (
    dataframe_id BIGINT NOT NULL REFERENCES dataframes(id) ON DELETE CASCADE,
    quality_characteristic_id BIGINT NOT NULL REFERENCES quality_characteristics(id) ON DELETE CASCADE,
    PRIMARY KEY (dataframe_id, quality_characteristic_id)
)
"#;

const CREATE_DATAFRAME_TARGETS: &str = r#"
CREATE TABLE IF NOT EXISTS dataframe_targets (
    dataframe_id BIGINT NOT NULL REFERENCES dataframes(id) ON DELETE CASCADE,
    quality_characteristic_id BIGINT NOT NULL REFERENCES quality_characteristics(id) ON DELETE CASCADE,
    PRIMARY KEY (dataframe_id, quality_characteristic_id)
)
"#;

const CREATE_PIPELINE_BLOCK_SPECIFICATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS pipeline_block_specifications (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(200) NOT NULL UNIQUE,
    parameter JSONB NOT NULL DEFAULT '[]',
    workflow_template VARCHAR(200),
    template_entrypoint VARCHAR(200)
)
"#;

const CREATE_PIPELINE_BLOCKS: &str = r#"
CREATE TABLE IF NOT EXISTS pipeline_blocks (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100),
    parameter JSONB NOT NULL DEFAULT '[]',
    pipeline_block_specification_id BIGINT REFERENCES pipeline_block_specifications(id) ON DELETE SET NULL
)
"#;

const CREATE_RUN_SPECIFICATION_BLOCKS: &str = r#"
CREATE TABLE IF NOT EXISTS run_specification_blocks (
    ml_run_specification_id BIGINT NOT NULL REFERENCES ml_run_specifications(id) ON DELETE CASCADE,
    pipeline_block_id BIGINT NOT NULL REFERENCES pipeline_blocks(id) ON DELETE CASCADE,
    PRIMARY KEY (ml_run_specification_id, pipeline_block_id)
)
"#;

const ALTER_ML_RUN_SPECIFICATIONS: &str = r#"
ALTER TABLE ml_run_specifications
    ADD COLUMN IF NOT EXISTS dataframe_id BIGINT REFERENCES dataframes(id) ON DELETE SET NULL
"#;
