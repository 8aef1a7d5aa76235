pub mod expression;
pub mod gene_list;
