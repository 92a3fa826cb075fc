/// OpenAPI 文档
pub mod swagger;
