//! SeaORM entity models

mod course;
mod document;
mod user;

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use course::{
    Entity as CourseEntity,
    Model as Course,
    ActiveModel as CourseActiveModel,
    Column as CourseColumn,
};

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    DocumentStatus,
    file_type_from_name,
};
